//! Report rendering
//!
//! Pure functions over accumulated records. Nothing here runs a stage, reads a
//! file or looks at the clock.

use crate::health::HealthLog;
use crate::result::{RunResult, StepStatus};
use std::fmt::Write;

/// Inputs for the forward report
#[derive(Debug, Clone, Copy)]
pub struct MigrationSummary<'a> {
    /// Run timestamp
    pub timestamp: &'a str,
    /// Dry-run mode
    pub dry_run: bool,
    /// Backup the run resolved, if any
    pub backup_id: Option<&'a str>,
    /// Every health check recorded by the run
    pub checks: &'a HealthLog,
    /// Phases actually attempted
    pub phases: &'a RunResult,
    /// Command an operator runs to roll back
    pub rollback_command: &'a str,
}

/// Render the forward migration report
///
/// Lists only the phases that were attempted.
#[must_use]
pub fn render_migration_report(summary: &MigrationSummary<'_>) -> String {
    let tally = summary.checks.tally();
    let mut out = String::new();

    let _ = writeln!(out, "# Migration Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Timestamp: {}", summary.timestamp);
    let _ = writeln!(
        out,
        "Mode: {}",
        if summary.dry_run { "Dry Run" } else { "Production" }
    );
    let _ = writeln!(out, "Backup ID: {}", summary.backup_id.unwrap_or("N/A"));
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out, "- Passed: {}", tally.passed);
    let _ = writeln!(out, "- Failed: {}", tally.failed);
    let _ = writeln!(out, "- Warnings: {}", tally.warnings);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Phases");
    if summary.phases.steps.is_empty() {
        let _ = writeln!(out, "(none attempted)");
    }
    for step in &summary.phases.steps {
        let _ = writeln!(out, "{} {} ({}ms)", step.status.icon(), step.name, step.duration_ms);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Health Checks");
    for check in summary.checks.checks() {
        let _ = writeln!(out, "{} {}: {}", check.status.icon(), check.name, check.message);
    }

    if tally.failed > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Rollback");
        let _ = writeln!(out, "Failures were detected. To restore the previous deployment run:");
        let _ = writeln!(out);
        match summary.backup_id {
            Some(id) => {
                let _ = writeln!(out, "    {} {}", summary.rollback_command, id);
            }
            None => {
                let _ = writeln!(out, "    {} <backup-id>", summary.rollback_command);
                let _ = writeln!(out);
                let _ = writeln!(
                    out,
                    "No backup was created by this run; list available backups with `{}`.",
                    summary.rollback_command
                );
            }
        }
    }

    out
}

/// Inputs for the reverse report
#[derive(Debug, Clone, Copy)]
pub struct RollbackSummary<'a> {
    /// Backup being restored
    pub backup_id: &'a str,
    /// Run timestamp
    pub timestamp: &'a str,
    /// Force mode
    pub force: bool,
    /// Notifications requested
    pub notify: bool,
    /// The run's result (possibly partial)
    pub result: &'a RunResult,
    /// `(label, step name)` pairs for the System Status section
    pub status_rows: &'a [(&'a str, &'a str)],
}

fn step_status_label(result: &RunResult, step: &str) -> &'static str {
    match result.step(step).map(|s| s.status) {
        Some(StepStatus::Success) => "✅ Restored",
        Some(StepStatus::Failed) => "❌ Failed",
        Some(StepStatus::Skipped) => "⏭️ Skipped",
        None => "⏸️ Not attempted",
    }
}

/// Render the reverse rollback report
#[must_use]
pub fn render_rollback_report(summary: &RollbackSummary<'_>) -> String {
    let result = summary.result;
    let mut out = String::new();

    let _ = writeln!(out, "# Rollback Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Backup ID: {}", summary.backup_id);
    let _ = writeln!(out, "Timestamp: {}", summary.timestamp);
    let _ = writeln!(out, "Mode: {}", if summary.force { "Force" } else { "Standard" });
    let _ = writeln!(out, "Notifications: {}", if summary.notify { "Enabled" } else { "Disabled" });
    let _ = writeln!(out, "Duration: {:.2}s", result.total_duration);
    let _ = writeln!(out, "Result: {}", if result.success { "SUCCESS" } else { "FAILED" });
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out, "- Succeeded: {}", result.count(StepStatus::Success));
    let _ = writeln!(out, "- Failed: {}", result.count(StepStatus::Failed));
    let _ = writeln!(out, "- Skipped: {}", result.count(StepStatus::Skipped));
    let _ = writeln!(out);

    let _ = writeln!(out, "## Steps");
    for step in &result.steps {
        let _ = writeln!(
            out,
            "{} {}{} ({}ms): {}",
            step.status.icon(),
            step.name,
            if step.critical { "" } else { " [non-critical]" },
            step.duration_ms,
            step.message
        );
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        for (i, e) in result.errors.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, e);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## System Status");
    for (label, step) in summary.status_rows {
        let _ = writeln!(out, "- {}: {}", label, step_status_label(result, step));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Next Actions");
    if result.success {
        let _ = writeln!(out, "- [ ] Verify the site and scheduled jobs respond normally");
        let _ = writeln!(out, "- [ ] Watch error logs for the next hour");
        let _ = writeln!(out, "- [ ] Investigate why the migration needed a rollback");
        let _ = writeln!(out, "- [ ] Keep backup {} until the next migration succeeds", summary.backup_id);
    } else {
        let _ = writeln!(out, "- [ ] Review the errors above");
        let _ = writeln!(out, "- [ ] Check data store contents for partially restored tables");
        if !summary.force {
            let _ = writeln!(out, "- [ ] Re-run with --force once the cause is understood");
        }
        let _ = writeln!(out, "- [ ] Escalate to the on-call engineer");
    }

    out
}
