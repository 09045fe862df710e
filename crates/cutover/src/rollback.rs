//! Reverse rollback
//!
//! Six steps run under [`FailurePolicy::CriticalUnlessForced`]. The run log
//! is written whether the run completes or aborts.

use crate::logs::{write_run_log, RollbackLog};
use crate::settings::{Environment, Layout, Settings, ENV_STORE_KEY, ENV_STORE_URL};
use cutover_backup::{BackupStore, ConfigGateway, SafetyCopies};
use cutover_core::report::{render_rollback_report, RollbackSummary};
use cutover_core::{
    CutoverError, FailurePolicy, RunResult, RunTimestamp, Sequencer, StageError, StageHandler, StageOutcome,
    StageSpec,
};
use cutover_gateway::{compose_rollback_email, NotificationGateway, RollbackNotice};
use cutover_store::{strip_identity, DataStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// `(label, step)` rows of the report's System Status section
pub const STATUS_ROWS: [(&str, &str); 3] = [
    ("Configuration", "restore-vercel-config"),
    ("Database", "restore-database"),
    ("Health checks", "verify-system-health"),
];

/// Reverse steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Snapshot exists and is intact
    ValidateBackup,
    /// Pause traffic (simulated)
    StopCurrentSystem,
    /// Put the backed-up deployment config back
    RestoreVercelConfig,
    /// Put the backed-up tables back
    RestoreDatabase,
    /// Data store, endpoints and secrets are in place
    VerifySystemHealth,
    /// Email the operator
    SendNotifications,
}

/// The reverse plan, in execution order
#[must_use]
pub fn rollback_plan() -> Vec<StageSpec<Step>> {
    vec![
        StageSpec::new("validate-backup", "Check backup presence and integrity", Step::ValidateBackup),
        StageSpec::new("stop-current-system", "Pause the current system", Step::StopCurrentSystem).non_critical(),
        StageSpec::new(
            "restore-vercel-config",
            "Restore the deployment configuration",
            Step::RestoreVercelConfig,
        ),
        StageSpec::new("restore-database", "Restore tracked tables", Step::RestoreDatabase),
        StageSpec::new("verify-system-health", "Verify the restored system", Step::VerifySystemHealth),
        StageSpec::new("send-notifications", "Notify the operator", Step::SendNotifications).non_critical(),
    ]
}

/// Reverse run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRun {
    /// Backup to restore
    pub backup_id: String,
    /// Absorb critical failures
    pub force: bool,
    /// Email the operator at the end
    pub notify: bool,
    /// Fixed at run start
    pub timestamp: RunTimestamp,
    /// Snapshot directory the id maps to
    pub backup_directory: PathBuf,
    /// Correlation id for logs and store requests
    pub run_id: Ulid,
}

/// State threaded through the reverse steps
#[derive(Debug)]
pub struct RollbackContext {
    /// Run configuration
    pub run: RollbackRun,
    /// Tables that failed to restore under force
    pub failed_tables: Vec<String>,
    /// Non-fatal problems (safety copies, forced integrity bypass)
    pub warnings: Vec<String>,
}

impl RollbackContext {
    /// Fresh context for a run
    #[must_use]
    pub fn new(run: RollbackRun) -> Self {
        Self {
            run,
            failed_tables: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
    from: String,
}

/// Runs the reverse plan
pub struct MigrationRollback {
    settings: Settings,
    layout: Layout,
    env: Environment,
    store: Arc<dyn DataStore>,
    backups: BackupStore,
    config: ConfigGateway,
    safety: SafetyCopies,
    notifier: Option<Notifier>,
    plan: Vec<StageSpec<Step>>,
}

impl std::fmt::Debug for MigrationRollback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRollback")
            .field("root", &self.layout.root)
            .field("store", &self.store.kind())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl MigrationRollback {
    /// Rollback for the repository at `layout.root`
    #[must_use]
    pub fn new(settings: Settings, layout: Layout, env: Environment, store: Arc<dyn DataStore>) -> Self {
        Self {
            backups: BackupStore::new(&layout.backups),
            config: ConfigGateway::new(&layout.deployment_config),
            safety: SafetyCopies::new(&layout.rollback_safety),
            settings,
            layout,
            env,
            store,
            notifier: None,
            plan: rollback_plan(),
        }
    }

    /// Send notifications through `gateway` from the verified `from` address
    #[must_use]
    pub fn with_notifier(mut self, gateway: Arc<dyn NotificationGateway>, from: impl Into<String>) -> Self {
        self.notifier = Some(Notifier {
            gateway,
            from: from.into(),
        });
        self
    }

    /// Snapshot store the run reads from
    #[must_use]
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Configuration for restoring `backup_id`
    #[must_use]
    pub fn run_for(&self, backup_id: &str, force: bool, notify: bool) -> RollbackRun {
        RollbackRun {
            backup_id: backup_id.to_string(),
            force,
            notify,
            timestamp: RunTimestamp::now(),
            backup_directory: self.backups.dir_for(backup_id),
            run_id: Ulid::new(),
        }
    }

    /// Run every step and persist the run log
    ///
    /// # Errors
    /// [`CutoverError::CriticalStepFailed`] when a critical step fails
    /// outside force mode
    pub async fn execute(&self, ctx: &mut RollbackContext) -> Result<RunResult, CutoverError> {
        tracing::warn!(
            "starting rollback run {} to backup {}{}",
            ctx.run.run_id,
            ctx.run.backup_id,
            if ctx.run.force { " (force)" } else { "" }
        );
        let outcome = Sequencer::new(&self.plan, FailurePolicy::critical_unless_forced(ctx.run.force))
            .run(self, ctx)
            .await;

        let result = match &outcome {
            Ok(result) => result,
            Err(e) => e.partial_result(),
        };
        self.persist(ctx, result);
        outcome
    }

    fn persist(&self, ctx: &RollbackContext, result: &RunResult) {
        let log = RollbackLog {
            config: &ctx.run,
            result,
            timestamp: RunTimestamp::now().to_string(),
        };
        if let Err(e) = write_run_log(&self.layout.rollback_logs, "rollback", &ctx.run.timestamp, &log) {
            tracing::error!("failed to write rollback log: {}", e);
        }
    }

    /// Render the report for a finished or aborted run
    #[must_use]
    pub fn report(&self, ctx: &RollbackContext, result: &RunResult) -> String {
        render_rollback_report(&RollbackSummary {
            backup_id: &ctx.run.backup_id,
            timestamp: ctx.run.timestamp.as_str(),
            force: ctx.run.force,
            notify: ctx.run.notify,
            result,
            status_rows: &STATUS_ROWS,
        })
    }

    fn validate_backup(&self, ctx: &RollbackContext) -> Result<StageOutcome, StageError> {
        let dir = self.backups.required_members(&ctx.run.backup_id)?;
        Ok(StageOutcome::done(format!("Backup found at {}", dir.display())))
    }

    fn check_backup_integrity(&self, ctx: &mut RollbackContext) -> Result<bool, StageError> {
        let report = self.backups.verify_integrity(&ctx.run.backup_id)?;
        if report.is_intact() {
            tracing::info!("backup integrity verified ({} files)", report.checked);
            return Ok(true);
        }
        let message = format!(
            "Backup integrity check failed: mismatched [{}], missing [{}]",
            report.mismatches.join(", "),
            report.missing.join(", ")
        );
        if ctx.run.force {
            ctx.warn(format!("{message} (ignored: force)"));
            Ok(true)
        } else {
            Err(StageError::failed(message))
        }
    }

    async fn stop_current_system(&self) -> StageOutcome {
        let pause = Duration::from_secs(self.settings.rollback.pause_secs);
        tracing::info!("pausing current system for {}s (simulated)", pause.as_secs());
        tokio::time::sleep(pause).await;
        StageOutcome::done("System paused")
    }

    fn restore_vercel_config(&self, ctx: &mut RollbackContext) -> Result<StageOutcome, StageError> {
        if self.config.exists() {
            let aside = self.safety.config_path(ctx.run.timestamp.as_str());
            match self.config.copy_aside(&aside) {
                Ok(()) => tracing::info!("current config saved to {}", aside.display()),
                Err(e) => ctx.warn(format!("could not save current config: {e}")),
            }
        }
        let source = self.backups.config_copy(&ctx.run.backup_id)?;
        self.config.restore_from(&source)?;
        Ok(StageOutcome::done("Deployment configuration restored"))
    }

    fn validate_vercel_config(&self) -> bool {
        match self.config.validate_shape() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("restored config invalid: {}", e);
                false
            }
        }
    }

    async fn restore_database(&self, ctx: &mut RollbackContext) -> Result<StageOutcome, StageError> {
        let store_settings = &self.settings.store;
        let transactional = self.store.supports_transactions();
        tracing::info!(
            "restoring {} tables ({})",
            store_settings.tables.len(),
            if transactional { "transactional" } else { "delete then insert" }
        );

        let mut restored = 0usize;
        for table in &store_settings.tables {
            let dump = match self.backups.read_dump(&ctx.run.backup_id, table) {
                Ok(Some(dump)) => dump,
                Ok(None) => {
                    ctx.warn(format!("no dump for {table} in backup"));
                    continue;
                }
                Err(e) if ctx.run.force => {
                    ctx.warn(format!("failed to read {table} dump: {e}"));
                    ctx.failed_tables.push(table.clone());
                    continue;
                }
                Err(e) => return Err(StageError::failed(format!("Failed to read {table} dump: {e}"))),
            };
            if dump.data.is_empty() {
                tracing::info!("{} dump is empty, leaving table as is", table);
                continue;
            }

            match self.store.fetch_all(table).await {
                Ok(live) => {
                    if let Err(e) = self.safety.save_table(ctx.run.timestamp.as_str(), table, live).await {
                        ctx.warn(format!("could not save current {table} rows: {e}"));
                    }
                }
                Err(e) => ctx.warn(format!("could not read current {table} rows: {e}")),
            }

            let rows = strip_identity(&dump.data, &store_settings.identity_field);
            // a transactional delete leaves nothing to upsert against
            let natural_key = if self.store.supports_transactions() {
                None
            } else {
                store_settings.natural_key(table)
            };
            match self.store.replace_all(table, &rows, natural_key).await {
                Ok(report) => {
                    tracing::info!("restored {}: -{} +{}", table, report.deleted, report.inserted);
                    restored += 1;
                }
                Err(e) if ctx.run.force => {
                    ctx.warn(format!("failed to restore {table}: {e}"));
                    ctx.failed_tables.push(table.clone());
                }
                Err(e) => return Err(StageError::failed(format!("Failed to restore {table}: {e}"))),
            }
        }

        if ctx.failed_tables.is_empty() {
            Ok(StageOutcome::done(format!("{restored} tables restored")))
        } else {
            Ok(StageOutcome::done(format!(
                "{restored} tables restored, failed: {}",
                ctx.failed_tables.join(", ")
            )))
        }
    }

    async fn verify_system_health(&self) -> Result<StageOutcome, StageError> {
        self.store
            .ping()
            .await
            .map_err(|e| StageError::failed(format!("Data store unreachable: {e}")))?;

        for rel in &self.settings.rollback.canonical_endpoints {
            if !self.layout.root.join(rel).is_file() {
                return Err(StageError::failed(format!("Missing endpoint file: {}", rel.display())));
            }
        }

        for var in [ENV_STORE_URL, ENV_STORE_KEY] {
            if !self.env.is_set(var) {
                return Err(StageError::failed(format!("Missing environment value: {var}")));
            }
        }
        Ok(StageOutcome::done("All systems verified"))
    }

    async fn send_notifications(
        &self,
        ctx: &mut RollbackContext,
        progress: &RunResult,
    ) -> Result<StageOutcome, StageError> {
        if !ctx.run.notify {
            return Ok(StageOutcome::skipped("Notifications disabled"));
        }
        let Some(notifier) = &self.notifier else {
            ctx.warn("SendGrid not configured".to_string());
            return Ok(StageOutcome::done("SendGrid not configured"));
        };

        let mut summary = progress.clone();
        summary.success = !progress.has_failed_critical();
        let sent = match compose_rollback_email(
            &RollbackNotice {
                backup_id: &ctx.run.backup_id,
                run_timestamp: ctx.run.timestamp.as_str(),
                force: ctx.run.force,
                to: &self.settings.rollback.operator_email,
                from: &notifier.from,
            },
            &summary,
            chrono::Utc::now(),
        ) {
            Ok(email) => notifier.gateway.send(&email).await.map(|()| email.to),
            Err(e) => Err(e),
        };

        match sent {
            Ok(to) => Ok(StageOutcome::done(format!("Notified {to}"))),
            Err(e) if ctx.run.force => {
                ctx.warn(format!("notification failed: {e}"));
                Ok(StageOutcome::done("Notification failed (ignored: force)"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl StageHandler for MigrationRollback {
    type Stage = Step;
    type Context = RollbackContext;

    async fn execute(
        &self,
        step: &Step,
        ctx: &mut RollbackContext,
        progress: &RunResult,
    ) -> Result<StageOutcome, StageError> {
        match step {
            Step::ValidateBackup => self.validate_backup(ctx),
            Step::StopCurrentSystem => Ok(self.stop_current_system().await),
            Step::RestoreVercelConfig => self.restore_vercel_config(ctx),
            Step::RestoreDatabase => self.restore_database(ctx).await,
            Step::VerifySystemHealth => self.verify_system_health().await,
            Step::SendNotifications => self.send_notifications(ctx, progress).await,
        }
    }

    async fn validate(&self, step: &Step, ctx: &mut RollbackContext) -> Result<bool, StageError> {
        match step {
            Step::ValidateBackup => self.check_backup_integrity(ctx),
            Step::RestoreVercelConfig => Ok(self.validate_vercel_config()),
            Step::RestoreDatabase => Ok(self.store.ping().await.is_ok()),
            Step::StopCurrentSystem | Step::VerifySystemHealth | Step::SendNotifications => Ok(true),
        }
    }
}
