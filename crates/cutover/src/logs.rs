//! Run log persistence
//!
//! One JSON file per run: `<dir>/<prefix>-<timestamp>.json`.

use cutover_core::{HealthLog, RunResult, RunTimestamp, StageError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Forward run log
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationLog<'a> {
    /// Run timestamp
    pub timestamp: &'a RunTimestamp,
    /// Backup the run resolved
    pub backup_id: Option<&'a str>,
    /// Dry-run mode
    pub dry_run: bool,
    /// Every recorded check
    pub health_checks: &'a HealthLog,
    /// No check failed
    pub success: bool,
}

/// Reverse run log
#[derive(Debug, Serialize)]
pub struct RollbackLog<'a, C: Serialize> {
    /// Run configuration
    pub config: &'a C,
    /// Full or partial result
    pub result: &'a RunResult,
    /// When the log was written
    pub timestamp: String,
}

/// Write `value` as pretty JSON to `<dir>/<prefix>-<timestamp>.json`
///
/// # Errors
/// I/O or serialization failures
pub fn write_run_log<T: Serialize>(
    dir: &Path,
    prefix: &str,
    timestamp: &RunTimestamp,
    value: &T,
) -> Result<PathBuf, StageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{prefix}-{timestamp}.json"));
    std::fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    tracing::info!("run log written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::HealthCheck;

    #[test]
    fn migration_log_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let ts = RunTimestamp::from_datetime(chrono::DateTime::UNIX_EPOCH);
        let mut checks = HealthLog::new();
        checks.record(HealthCheck::warning("health:fallback-workflow", "missing"));

        let path = write_run_log(
            tmp.path(),
            "migration",
            &ts,
            &MigrationLog {
                timestamp: &ts,
                backup_id: None,
                dry_run: false,
                health_checks: &checks,
                success: true,
            },
        )
        .unwrap();

        assert_eq!(path.file_name().unwrap(), "migration-1970-01-01T00-00-00-000Z.json");
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["backupId"], serde_json::Value::Null);
        assert_eq!(value["dryRun"], false);
        assert_eq!(value["healthChecks"][0]["status"], "warning");
    }
}
