//! Health-check records
//!
//! A [`HealthLog`] is owned by exactly one run and threaded through every
//! stage as part of that run's context. Records are appended, never edited.
//!
//! Check names carry a stage prefix (`pre:`, `deploy:`, `health:`) so a stage
//! validator can ask "did anything of mine fail" without tracking indices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Check succeeded
    Pass,
    /// Check failed; blocks the owning stage
    Fail,
    /// Worth a look, does not block
    Warning,
}

impl HealthStatus {
    /// Marker used in rendered reports
    #[inline]
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Pass => "✅",
            Self::Fail => "❌",
            Self::Warning => "⚠️",
        }
    }
}

/// One recorded observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check key, prefixed by the owning stage
    pub name: String,
    /// Outcome
    pub status: HealthStatus,
    /// Human-readable message
    pub message: String,
    /// Free-form payload (counts, durations, paths)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HealthCheck {
    /// Create a check with an explicit status
    #[inline]
    pub fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            details: None,
        }
    }

    /// Passing check
    #[inline]
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Pass, message)
    }

    /// Failing check
    #[inline]
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Fail, message)
    }

    /// Warning
    #[inline]
    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Warning, message)
    }

    /// Attach a details payload
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Pass/fail/warning counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTally {
    /// Passing checks
    pub passed: usize,
    /// Failing checks
    pub failed: usize,
    /// Warnings
    pub warnings: usize,
}

impl HealthTally {
    /// Total number of checks counted
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.warnings
    }
}

/// Append-only list of health checks for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthLog {
    checks: Vec<HealthCheck>,
}

impl HealthLog {
    /// Create an empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a check and log it
    pub fn record(&mut self, check: HealthCheck) {
        match check.status {
            HealthStatus::Pass => tracing::info!("{} {}: {}", check.status.icon(), check.name, check.message),
            HealthStatus::Warning => tracing::warn!("{} {}: {}", check.status.icon(), check.name, check.message),
            HealthStatus::Fail => tracing::error!("{} {}: {}", check.status.icon(), check.name, check.message),
        }
        self.checks.push(check);
    }

    /// All checks in recording order
    #[inline]
    #[must_use]
    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    /// Checks whose name starts with `prefix`
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a HealthCheck> + 'a {
        self.checks.iter().filter(move |c| c.name.starts_with(prefix))
    }

    /// Whether any check under `prefix` failed
    #[must_use]
    pub fn has_failures_with_prefix(&self, prefix: &str) -> bool {
        self.with_prefix(prefix)
            .any(|c| c.status == HealthStatus::Fail)
    }

    /// Whether any check failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == HealthStatus::Fail)
    }

    /// Count checks by status
    #[must_use]
    pub fn tally(&self) -> HealthTally {
        self.checks.iter().fold(HealthTally::default(), |mut t, c| {
            match c.status {
                HealthStatus::Pass => t.passed += 1,
                HealthStatus::Fail => t.failed += 1,
                HealthStatus::Warning => t.warnings += 1,
            }
            t
        })
    }

    /// Number of recorded checks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// True when nothing has been recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefix_failures_are_scoped() {
        let mut log = HealthLog::new();
        log.record(HealthCheck::pass("pre:config", "2 jobs"));
        log.record(HealthCheck::fail("deploy:route", "missing"));
        log.record(HealthCheck::warning("health:fallback", "no workflow"));

        assert!(!log.has_failures_with_prefix("pre:"));
        assert!(log.has_failures_with_prefix("deploy:"));
        assert!(!log.has_failures_with_prefix("health:"));
        assert!(log.has_failures());
    }

    #[test]
    fn tally_counts_each_status() {
        let mut log = HealthLog::new();
        log.record(HealthCheck::pass("a", ""));
        log.record(HealthCheck::pass("b", ""));
        log.record(HealthCheck::fail("c", ""));
        log.record(HealthCheck::warning("d", ""));

        let tally = log.tally();
        assert_eq!(tally.passed, 2);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.warnings, 1);
        assert_eq!(tally.total(), log.len());
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut log = HealthLog::new();
        log.record(HealthCheck::pass("pre:env", "ok").with_details(json!({"count": 2})));

        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(
            value,
            json!([{"name": "pre:env", "status": "pass", "message": "ok", "details": {"count": 2}}])
        );
    }
}
