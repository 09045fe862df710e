//! Run results
//!
//! Both directions produce the same shape: the ordered list of stages that
//! were actually attempted, the error strings collected along the way, and a
//! success flag computed from the critical stages only.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one attempted stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Executed and validated
    Success,
    /// Validation returned false or the body raised
    Failed,
    /// The stage chose not to act (e.g. notifications disabled)
    Skipped,
}

impl StepStatus {
    /// Marker used in rendered reports
    #[inline]
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Failed => "❌",
            Self::Skipped => "⏭️",
        }
    }
}

/// Record of one attempted stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Stage name
    pub name: String,
    /// Outcome
    pub status: StepStatus,
    /// Message from the stage or the error that stopped it
    pub message: String,
    /// Wall time in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Declared criticality of the stage
    #[serde(default = "default_critical")]
    pub critical: bool,
}

fn default_critical() -> bool {
    true
}

impl StepRecord {
    /// Create a record
    #[inline]
    pub fn new(
        name: impl Into<String>,
        status: StepStatus,
        message: impl Into<String>,
        elapsed: Duration,
        critical: bool,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            critical,
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// True iff no critical stage failed
    pub success: bool,
    /// Attempted stages, in order
    pub steps: Vec<StepRecord>,
    /// Wall time of the run in seconds
    pub total_duration: f64,
    /// Error strings, in the order they occurred
    pub errors: Vec<String>,
}

impl RunResult {
    /// Empty, not yet successful result
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for the named stage, if it was attempted
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of attempted stages with the given status
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Names of attempted stages, in order
    pub fn attempted(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// Whether any critical stage failed
    #[must_use]
    pub fn has_failed_critical(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.critical && s.status == StepStatus::Failed)
    }

    /// Stamp duration and derive `success` from the critical stages
    pub fn finish(&mut self, elapsed: Duration) {
        self.total_duration = elapsed.as_secs_f64();
        self.success = !self.has_failed_critical();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: StepStatus, critical: bool) -> StepRecord {
        StepRecord::new(name, status, "", Duration::from_millis(5), critical)
    }

    #[test]
    fn failed_non_critical_step_keeps_success() {
        let mut result = RunResult::new();
        result.steps.push(record("validate-backup", StepStatus::Success, true));
        result.steps.push(record("send-notifications", StepStatus::Failed, false));
        result.finish(Duration::from_secs(2));

        assert!(result.success);
        assert_eq!(result.count(StepStatus::Failed), 1);
        assert!((result.total_duration - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failed_critical_step_clears_success() {
        let mut result = RunResult::new();
        result.steps.push(record("restore-database", StepStatus::Failed, true));
        result.finish(Duration::ZERO);

        assert!(!result.success);
        assert_eq!(result.step("restore-database").map(|s| s.status), Some(StepStatus::Failed));
        assert!(result.step("send-notifications").is_none());
    }

    #[test]
    fn serializes_duration_field_as_duration() {
        let r = record("stop-current-system", StepStatus::Skipped, false);
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["duration"], 5);
        assert_eq!(value["status"], "skipped");
    }
}
