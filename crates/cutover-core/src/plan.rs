//! Stage plans
//!
//! A plan is a fixed, statically ordered list of [`StageSpec`]s. Each spec is
//! pure data: a name, a tag the handler dispatches on, a criticality flag and
//! whether a compensating rollback exists. The behavior lives behind the
//! [`StageHandler`](crate::StageHandler) trait.

/// One declared stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec<K> {
    /// Unique name within the plan
    pub name: &'static str,
    /// One-line description for logs and reports
    pub description: &'static str,
    /// Tag the handler dispatches on
    pub kind: K,
    /// Failure aborts the run (subject to the failure policy)
    pub critical: bool,
    /// The handler provides a rollback for this stage
    pub compensated: bool,
}

impl<K> StageSpec<K> {
    /// Critical stage without rollback
    #[inline]
    pub fn new(name: &'static str, description: &'static str, kind: K) -> Self {
        Self {
            name,
            description,
            kind,
            critical: true,
            compensated: false,
        }
    }

    /// Mark as non-critical
    #[inline]
    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Declare a compensating rollback
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self) -> Self {
        self.compensated = true;
        self
    }
}

/// How the executor reacts to a failed stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Forward path: run the failing critical stage's own rollback (if
    /// declared and only after a validation failure), then abort. No
    /// cascading rollback. Non-critical failures are recorded and skipped.
    Compensate,
    /// Reverse path: critical failures abort unless `force` is set;
    /// non-critical failures never abort.
    CriticalUnlessForced {
        /// Operator override
        force: bool,
    },
}

impl FailurePolicy {
    /// Reverse-path policy
    #[inline]
    #[must_use]
    pub fn critical_unless_forced(force: bool) -> Self {
        Self::CriticalUnlessForced { force }
    }
}

/// Ensure stage names are unique within a plan
///
/// # Errors
/// Returns the first duplicated name
pub fn check_unique_names<K>(plan: &[StageSpec<K>]) -> Result<(), &'static str> {
    let mut seen = std::collections::HashSet::new();
    for spec in plan {
        if !seen.insert(spec.name) {
            return Err(spec.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_flags() {
        let spec = StageSpec::new("deploy-new-system", "Deploy", 3u8).with_rollback();
        assert!(spec.critical);
        assert!(spec.compensated);

        let spec = StageSpec::new("send-notifications", "Notify", 6u8).non_critical();
        assert!(!spec.critical);
        assert!(!spec.compensated);
    }

    #[test]
    fn duplicate_names_detected() {
        let plan = vec![
            StageSpec::new("a", "", 0u8),
            StageSpec::new("b", "", 1u8),
            StageSpec::new("a", "", 2u8),
        ];
        assert_eq!(check_unique_names(&plan), Err("a"));
        assert!(check_unique_names(&plan[..2]).is_ok());
    }
}
