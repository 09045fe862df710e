//! Rollback safety copies
//!
//! Written before a rollback overwrites live state. Callers treat write
//! failures as warnings.

use crate::error::BackupError;
use crate::snapshot::TableDump;
use cutover_store::Row;
use std::path::{Path, PathBuf};

/// Directory holding dated pre-rollback copies
#[derive(Debug, Clone)]
pub struct SafetyCopies {
    dir: PathBuf,
}

impl SafetyCopies {
    /// Copies under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Base directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the pre-rollback configuration goes
    #[must_use]
    pub fn config_path(&self, timestamp: &str) -> PathBuf {
        self.dir.join(format!("vercel-{timestamp}.json"))
    }

    /// Where a table's pre-rollback rows go
    #[must_use]
    pub fn table_path(&self, timestamp: &str, table: &str) -> PathBuf {
        self.dir.join(format!("rollback-{timestamp}")).join(format!("{table}.json"))
    }

    /// Write a table's current rows in dump format
    ///
    /// # Errors
    /// I/O or serialization failures
    pub async fn save_table(&self, timestamp: &str, table: &str, rows: Vec<Row>) -> Result<PathBuf, BackupError> {
        let path = self.table_path(timestamp, table);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let dump = TableDump {
            table: table.to_string(),
            data: rows,
        };
        tokio::fs::write(&path, serde_json::to_vec_pretty(&dump)?).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn saves_rows_as_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let copies = SafetyCopies::new(tmp.path());
        let row = json!({"id": 7}).as_object().cloned().unwrap();
        let path = copies.save_table("t1", "metrics", vec![row]).await.unwrap();

        assert_eq!(path, tmp.path().join("rollback-t1/metrics.json"));
        let dump: TableDump = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(dump.table, "metrics");
        assert_eq!(dump.data.len(), 1);
        assert_eq!(copies.config_path("t1"), tmp.path().join("vercel-t1.json"));
    }
}
