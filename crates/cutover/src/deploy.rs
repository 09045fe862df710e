//! Forward migration
//!
//! Five phases run under [`FailurePolicy::Compensate`]. Every check a phase
//! records is named `<prefix>:<what>`, and a phase validates by looking only
//! at its own prefix:
//!
//! | phase | prefix | rollback |
//! |---|---|---|
//! | `pre-migration-validation` | `pre:` | - |
//! | `backup-creation` | `backup:` | - |
//! | `deploy-new-system` | `deploy:` | restore the deployment config from the backup |
//! | `health-checks` | `health:` | - |
//! | `cleanup` | - | - (non-critical) |

use crate::checks;
use crate::logs::{write_run_log, MigrationLog};
use crate::settings::{
    Environment, Layout, Settings, ENV_SENDGRID_FROM, ENV_SENDGRID_KEY, ENV_STORE_KEY, ENV_STORE_URL,
};
use cutover_backup::{BackupStore, ConfigGateway};
use cutover_core::report::{render_migration_report, MigrationSummary};
use cutover_core::{
    CutoverError, DegradationManager, FailurePolicy, FallbackManager, HealthCheck, HealthLog, HealthStatus,
    RunResult, RunTimestamp, Sequencer, ServiceLevel, StageError, StageHandler, StageOutcome, StageSpec,
};
use cutover_gateway::WorkflowDispatch;
use cutover_store::DataStore;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Forward phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Current deployment, data store, endpoints and secrets look right
    PreMigrationValidation,
    /// Snapshot (or reuse) a backup
    BackupCreation,
    /// New system components are in place
    DeployNewSystem,
    /// Post-deploy checks
    HealthChecks,
    /// Persist the run log
    Cleanup,
}

/// The forward plan, in execution order
#[must_use]
pub fn migration_plan() -> Vec<StageSpec<Phase>> {
    vec![
        StageSpec::new(
            "pre-migration-validation",
            "Validate current deployment and environment",
            Phase::PreMigrationValidation,
        ),
        StageSpec::new("backup-creation", "Back up configuration and data", Phase::BackupCreation),
        StageSpec::new("deploy-new-system", "Verify new system components", Phase::DeployNewSystem).with_rollback(),
        StageSpec::new("health-checks", "Check the deployed system", Phase::HealthChecks),
        StageSpec::new("cleanup", "Write the migration log", Phase::Cleanup).non_critical(),
    ]
}

/// Forward run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRun {
    /// No side effects beyond reads
    pub dry_run: bool,
    /// Reuse this backup instead of creating one
    pub backup_id: Option<String>,
    /// Fixed at run start
    pub timestamp: RunTimestamp,
    /// Correlation id for logs and store requests
    pub run_id: Ulid,
}

impl MigrationRun {
    /// Production run starting now
    #[must_use]
    pub fn new() -> Self {
        Self {
            dry_run: false,
            backup_id: None,
            timestamp: RunTimestamp::now(),
            run_id: Ulid::new(),
        }
    }

    /// Set dry-run mode
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reuse an existing backup
    #[must_use]
    pub fn with_backup_id(mut self, id: Option<String>) -> Self {
        self.backup_id = id;
        self
    }
}

impl Default for MigrationRun {
    fn default() -> Self {
        Self::new()
    }
}

/// State threaded through the forward phases
#[derive(Debug)]
pub struct ForwardContext {
    /// Run configuration (the backup id is filled in by `backup-creation`)
    pub run: MigrationRun,
    /// Every check recorded so far
    pub checks: HealthLog,
    /// Fallbacks registered by `health-checks`
    pub fallbacks: FallbackManager,
    /// Service level chosen by `health-checks`
    pub service_level: Option<ServiceLevel>,
    /// Where `cleanup` wrote the run log
    pub log_path: Option<PathBuf>,
}

impl ForwardContext {
    /// Fresh context for a run
    #[must_use]
    pub fn new(run: MigrationRun) -> Self {
        Self {
            run,
            checks: HealthLog::new(),
            fallbacks: FallbackManager::new(),
            service_level: None,
            log_path: None,
        }
    }
}

/// Runs the forward plan
pub struct MigrationDeployer {
    settings: Settings,
    layout: Layout,
    env: Environment,
    store: Arc<dyn DataStore>,
    backups: BackupStore,
    config: ConfigGateway,
    plan: Vec<StageSpec<Phase>>,
}

impl std::fmt::Debug for MigrationDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationDeployer")
            .field("root", &self.layout.root)
            .field("store", &self.store.kind())
            .finish_non_exhaustive()
    }
}

impl MigrationDeployer {
    /// Deployer for the repository at `layout.root`
    #[must_use]
    pub fn new(settings: Settings, layout: Layout, env: Environment, store: Arc<dyn DataStore>) -> Self {
        let backups = BackupStore::new(&layout.backups);
        let config = ConfigGateway::new(&layout.deployment_config);
        Self {
            settings,
            layout,
            env,
            store,
            backups,
            config,
            plan: migration_plan(),
        }
    }

    /// Run every phase
    ///
    /// # Errors
    /// [`CutoverError::PhaseFailed`] naming the first failing phase
    pub async fn execute(&self, ctx: &mut ForwardContext) -> Result<RunResult, CutoverError> {
        tracing::info!(
            "starting migration run {} ({})",
            ctx.run.run_id,
            if ctx.run.dry_run { "dry run" } else { "production" }
        );
        Sequencer::new(&self.plan, FailurePolicy::Compensate).run(self, ctx).await
    }

    /// Render the report for a finished or aborted run
    #[must_use]
    pub fn report(&self, ctx: &ForwardContext, phases: &RunResult) -> String {
        render_migration_report(&MigrationSummary {
            timestamp: ctx.run.timestamp.as_str(),
            dry_run: ctx.run.dry_run,
            backup_id: ctx.run.backup_id.as_deref(),
            checks: &ctx.checks,
            phases,
            rollback_command: &self.settings.migration.rollback_command,
        })
    }

    async fn pre_migration_validation(&self, ctx: &mut ForwardContext) -> StageOutcome {
        let before = ctx.checks.len();
        ctx.checks.record(checks::deployment_config(
            "pre:vercel-config",
            &self.config,
            self.settings.migration.expected_jobs,
        ));

        let (store_check, _) = checks::data_store("pre:data-store", self.store.as_ref()).await;
        ctx.checks.record(store_check);

        for rel in &self.settings.migration.endpoint_files {
            ctx.checks.record(checks::file_present(
                &format!("pre:endpoint:{}", rel.display()),
                &self.layout.root,
                rel,
                HealthStatus::Fail,
            ));
        }

        for var in [ENV_STORE_URL, ENV_STORE_KEY] {
            ctx.checks.record(checks::env_value(&format!("pre:env:{var}"), &self.env, var));
        }
        for var in [ENV_SENDGRID_KEY, ENV_SENDGRID_FROM] {
            if !self.env.is_set(var) {
                ctx.checks.record(HealthCheck::warning(
                    format!("pre:env:{var}"),
                    format!("{var} is not set; rollback notifications will be skipped"),
                ));
            }
        }

        StageOutcome::done(format!("{} checks recorded", ctx.checks.len() - before))
    }

    async fn backup_creation(&self, ctx: &mut ForwardContext) -> Result<StageOutcome, StageError> {
        if let Some(id) = &ctx.run.backup_id {
            return Ok(StageOutcome::done(format!("Using existing backup {id}")));
        }
        if ctx.run.dry_run {
            return Ok(StageOutcome::done("Dry run: no backup written"));
        }

        self.backups
            .create(
                ctx.run.timestamp.as_str(),
                &self.layout.deployment_config,
                self.store.as_ref(),
                &self.settings.store.tables,
            )
            .await?;
        ctx.run.backup_id = self.backups.latest_id()?;
        match &ctx.run.backup_id {
            Some(id) => Ok(StageOutcome::done(format!("Created backup {id}"))),
            None => Err(StageError::failed("backup written but no backup directory found")),
        }
    }

    fn validate_backup(&self, ctx: &mut ForwardContext) -> bool {
        let Some(id) = ctx.run.backup_id.clone() else {
            return ctx.run.dry_run;
        };
        match self.backups.metadata(&id) {
            Ok(metadata) => {
                let total: usize = metadata.total_records.values().sum();
                ctx.checks.record(
                    HealthCheck::pass("backup:metadata", format!("Backup {id} holds {total} records"))
                        .with_details(json!({ "totalRecords": metadata.total_records })),
                );
                true
            }
            Err(e) => {
                ctx.checks.record(HealthCheck::fail("backup:metadata", e.to_string()));
                false
            }
        }
    }

    fn deploy_new_system(&self, ctx: &ForwardContext) -> Result<StageOutcome, StageError> {
        if ctx.run.dry_run {
            return Ok(StageOutcome::done("Dry run: deployment not performed"));
        }
        let components = &self.settings.migration.components;
        let missing: Vec<String> = components
            .iter()
            .filter(|c| !self.layout.root.join(&c.path).is_file())
            .map(|c| c.path.display().to_string())
            .collect();
        if missing.is_empty() {
            Ok(StageOutcome::done(format!("{} components in place", components.len())))
        } else {
            tracing::warn!("missing new-system components: {}", missing.join(", "));
            Ok(StageOutcome::done(format!(
                "{}/{} components in place",
                components.len() - missing.len(),
                components.len()
            )))
        }
    }

    fn validate_deployment(&self, ctx: &mut ForwardContext) -> bool {
        // a dry run deploys nothing, so absent files are expected
        let missing = if ctx.run.dry_run {
            HealthStatus::Warning
        } else {
            HealthStatus::Fail
        };
        for component in &self.settings.migration.components {
            ctx.checks.record(checks::file_present(
                &format!("deploy:{}:{}", component.kind.as_str(), component.path.display()),
                &self.layout.root,
                &component.path,
                missing,
            ));
        }
        !ctx.checks.has_failures_with_prefix("deploy:")
    }

    fn restore_deployment_config(&self, ctx: &ForwardContext) -> Result<(), StageError> {
        let id = ctx
            .run
            .backup_id
            .as_deref()
            .ok_or_else(|| StageError::failed("no backup to restore the deployment config from"))?;
        let source = self.backups.config_copy(id)?;
        self.config.restore_from(&source)?;
        tracing::warn!("deployment config restored from backup {}", id);
        Ok(())
    }

    async fn health_checks(&self, ctx: &mut ForwardContext) -> StageOutcome {
        let (store_check, latency) = checks::data_store("health:data-store", self.store.as_ref()).await;
        let reachable = store_check.status == HealthStatus::Pass;
        ctx.checks.record(store_check);

        let degradation = &self.settings.degradation;
        let usage = degradation.simulated_usage;
        ctx.checks.record(
            HealthCheck::pass("health:platform-usage", "Platform usage within limits (simulated)")
                .with_details(serde_json::to_value(usage).unwrap_or_default()),
        );

        let mut manager = DegradationManager::new(degradation.thresholds)
            .with_functions(degradation.functions.iter().map(|(name, level)| (name.clone(), *level)));
        let level = manager.assess_system_load(&usage);
        manager.activate_degradation(level);
        ctx.service_level = Some(level);
        let details = json!({ "level": level, "enabled": manager.enabled_functions() });
        let level_check = match level {
            ServiceLevel::Full => HealthCheck::pass("health:service-level", "Service level FULL"),
            ServiceLevel::Essential => {
                HealthCheck::warning("health:service-level", "Service level ESSENTIAL: optional functions shed")
            }
            ServiceLevel::Minimal => {
                HealthCheck::fail("health:service-level", "Service level MINIMAL: system under critical load")
            }
        };
        ctx.checks.record(level_check.with_details(details));

        let fallback = self.fallback_workflow(ctx);
        ctx.checks.record(fallback);

        let budget = Duration::from_millis(self.settings.migration.timing_budget_ms);
        ctx.checks.record(if !reachable || latency <= budget {
            HealthCheck::pass("health:timing", format!("Round trip {}ms", latency.as_millis()))
        } else {
            HealthCheck::warning(
                "health:timing",
                format!("Round trip {}ms exceeds {}ms", latency.as_millis(), budget.as_millis()),
            )
        });

        StageOutcome::done(format!("Service level {level}"))
    }

    fn fallback_workflow(&self, ctx: &mut ForwardContext) -> HealthCheck {
        let migration = &self.settings.migration;
        let workflow = &migration.fallback_workflow;
        if !self.layout.root.join(workflow).is_file() {
            return HealthCheck::warning(
                "health:fallback-workflow",
                format!("{} missing; no fallback for {}", workflow.display(), migration.fallback_operation),
            );
        }

        let Some((token, repository)) = self.env.github() else {
            return HealthCheck::pass(
                "health:fallback-workflow",
                format!("{} present (dispatch credentials not set)", workflow.display()),
            );
        };
        let file_name = workflow
            .file_name()
            .map_or_else(|| workflow.display().to_string(), |n| n.to_string_lossy().into_owned());
        match WorkflowDispatch::new(token, repository, file_name) {
            Ok(action) => {
                ctx.fallbacks
                    .register(migration.fallback_operation.clone(), Arc::new(action));
                HealthCheck::pass(
                    "health:fallback-workflow",
                    format!("{} registered for {}", workflow.display(), migration.fallback_operation),
                )
            }
            Err(e) => HealthCheck::warning("health:fallback-workflow", e.to_string()),
        }
    }

    fn cleanup(&self, ctx: &mut ForwardContext) -> Result<StageOutcome, StageError> {
        if ctx.run.dry_run {
            return Ok(StageOutcome::done("Dry run: no log written"));
        }
        let log = MigrationLog {
            timestamp: &ctx.run.timestamp,
            backup_id: ctx.run.backup_id.as_deref(),
            dry_run: ctx.run.dry_run,
            health_checks: &ctx.checks,
            success: !ctx.checks.has_failures(),
        };
        let path = write_run_log(&self.layout.migration_logs, "migration", &ctx.run.timestamp, &log)?;
        let message = format!("Log written to {}", path.display());
        ctx.log_path = Some(path);
        Ok(StageOutcome::done(message))
    }
}

#[async_trait::async_trait]
impl StageHandler for MigrationDeployer {
    type Stage = Phase;
    type Context = ForwardContext;

    async fn execute(
        &self,
        phase: &Phase,
        ctx: &mut ForwardContext,
        _progress: &RunResult,
    ) -> Result<StageOutcome, StageError> {
        match phase {
            Phase::PreMigrationValidation => Ok(self.pre_migration_validation(ctx).await),
            Phase::BackupCreation => self.backup_creation(ctx).await,
            Phase::DeployNewSystem => self.deploy_new_system(ctx),
            Phase::HealthChecks => Ok(self.health_checks(ctx).await),
            Phase::Cleanup => self.cleanup(ctx),
        }
    }

    async fn validate(&self, phase: &Phase, ctx: &mut ForwardContext) -> Result<bool, StageError> {
        Ok(match phase {
            Phase::PreMigrationValidation => !ctx.checks.has_failures_with_prefix("pre:"),
            Phase::BackupCreation => self.validate_backup(ctx),
            Phase::DeployNewSystem => self.validate_deployment(ctx),
            Phase::HealthChecks => !ctx.checks.has_failures_with_prefix("health:"),
            Phase::Cleanup => true,
        })
    }

    async fn rollback(&self, phase: &Phase, ctx: &mut ForwardContext) -> Result<(), StageError> {
        match phase {
            Phase::DeployNewSystem => self.restore_deployment_config(ctx),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::plan::check_unique_names;

    #[test]
    fn plan_order_and_flags() {
        let plan = migration_plan();
        let names: Vec<_> = plan.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "pre-migration-validation",
                "backup-creation",
                "deploy-new-system",
                "health-checks",
                "cleanup"
            ]
        );
        assert!(check_unique_names(&plan).is_ok());
        assert_eq!(
            plan.iter().filter(|s| s.compensated).map(|s| s.name).collect::<Vec<_>>(),
            vec!["deploy-new-system"]
        );
        assert!(!plan[4].critical);
    }
}
