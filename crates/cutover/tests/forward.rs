use cutover::{Environment, ForwardContext, MigrationDeployer, MigrationRun, Settings};
use cutover_core::{CutoverError, HealthStatus, ServiceLevel, StepStatus};
use cutover_store::{DataStore, MemoryDataStore};
use cutover_test_utils::{deployment_config, seeded_store, RepoFixture, BACKUP_ID, CONFIG_FILE, STORE_ENV};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn deployer(repo: &RepoFixture, store: Arc<dyn DataStore>) -> MigrationDeployer {
    let settings = Settings::default();
    let layout = settings.paths.layout(repo.root());
    MigrationDeployer::new(settings, layout, Environment::from_pairs(STORE_ENV), store)
}

fn status_of(ctx: &ForwardContext, name: &str) -> Option<HealthStatus> {
    ctx.checks.checks().iter().find(|c| c.name == name).map(|c| c.status)
}

#[tokio::test]
async fn dry_run_without_backup_succeeds_without_writing() {
    let repo = RepoFixture::current();
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new().dry_run(true));

    let result = deployer.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(result.steps.len(), 5);
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Success));
    assert_eq!(ctx.run.backup_id, None);
    assert!(!repo.exists("backups"));
    assert!(!repo.exists("logs"));
    assert!(ctx.log_path.is_none());

    // components are not on disk yet; a dry run only warns about them
    assert_eq!(
        status_of(&ctx, "deploy:route:app/api/audit/route.ts"),
        Some(HealthStatus::Warning)
    );
    assert!(!ctx.checks.has_failures());

    let report = deployer.report(&ctx, &result);
    assert!(report.contains("Mode: Dry Run"));
    assert!(report.contains("Backup ID: N/A"));
}

#[tokio::test]
async fn one_declared_job_fails_pre_migration_validation() {
    let repo = RepoFixture::current();
    repo.write(CONFIG_FILE, &deployment_config(1));
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new());

    let err = deployer.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.to_string(), "Migration failed at phase: pre-migration-validation");
    assert!(matches!(err, CutoverError::PhaseFailed { .. }));
    let partial = err.partial_result();
    assert!(!partial.success);
    assert_eq!(partial.attempted().collect::<Vec<_>>(), vec!["pre-migration-validation"]);

    let config_check = ctx
        .checks
        .checks()
        .iter()
        .find(|c| c.name == "pre:vercel-config")
        .unwrap();
    assert_eq!(config_check.status, HealthStatus::Fail);
    assert_eq!(config_check.message, "Expected 2 cron jobs, found 1");
    assert!(!repo.exists("backups"));

    let report = deployer.report(&ctx, partial);
    assert!(report.contains("pre-migration-validation"));
    assert!(!report.contains("health-checks"));
}

#[tokio::test]
async fn unreachable_store_fails_pre_migration_validation() {
    let repo = RepoFixture::migrated();
    let store = seeded_store();
    store.set_unreachable(true);
    let deployer = deployer(&repo, Arc::new(store));
    let mut ctx = ForwardContext::new(MigrationRun::new());

    let err = deployer.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "pre-migration-validation");
    assert_eq!(status_of(&ctx, "pre:data-store"), Some(HealthStatus::Fail));
}

#[tokio::test]
async fn production_run_backs_up_and_logs() {
    let repo = RepoFixture::migrated();
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new());
    let timestamp = ctx.run.timestamp.to_string();

    let result = deployer.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(ctx.run.backup_id.as_deref(), Some(timestamp.as_str()));
    assert_eq!(repo.backups().list_ids().unwrap(), vec![timestamp.clone()]);
    assert_eq!(status_of(&ctx, "backup:metadata"), Some(HealthStatus::Pass));
    assert_eq!(ctx.service_level, Some(ServiceLevel::Full));
    assert!(!ctx.checks.has_failures());

    let log_path = ctx.log_path.clone().unwrap();
    assert!(log_path.ends_with(format!("logs/migration/migration-{timestamp}.json")));
    let log: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(log_path).unwrap()).unwrap();
    assert_eq!(log["backupId"], timestamp.as_str());
    assert_eq!(log["dryRun"], false);
    assert_eq!(log["success"], true);
    assert!(log["healthChecks"].as_array().unwrap().len() >= 10);
}

#[tokio::test]
async fn failed_log_write_does_not_fail_the_migration() {
    let repo = RepoFixture::migrated();
    repo.write("logs/migration", "not a directory");
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new());

    let result = deployer.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    let cleanup = result.step("cleanup").unwrap();
    assert_eq!(cleanup.status, StepStatus::Failed);
    assert!(!cleanup.critical);
    assert!(result.errors.iter().any(|e| e.starts_with("cleanup:")));
    assert!(ctx.log_path.is_none());
    assert!(!ctx.checks.has_failures());
    assert!(ctx.run.backup_id.is_some());
}

#[tokio::test]
async fn missing_components_roll_back_the_deployment_config() {
    let repo = RepoFixture::current();
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new());

    let err = deployer.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "deploy-new-system");
    let partial = err.partial_result();
    assert_eq!(partial.step("deploy-new-system").unwrap().status, StepStatus::Failed);
    assert!(partial.step("health-checks").is_none());
    assert!(partial.errors.iter().all(|e| !e.contains("rollback")));
    assert_eq!(
        status_of(&ctx, "deploy:monitoring:lib/monitoring/health.ts"),
        Some(HealthStatus::Fail)
    );

    let id = ctx.run.backup_id.clone().unwrap();
    let backed_up = std::fs::read_to_string(repo.backups().config_copy(&id).unwrap()).unwrap();
    assert_eq!(repo.read(CONFIG_FILE), backed_up);
    assert!(!repo.exists("logs"));
}

#[tokio::test]
async fn existing_backup_is_reused() {
    let repo = RepoFixture::migrated();
    let store = seeded_store();
    repo.seed_backup(&store).await;
    let deployer = deployer(&repo, Arc::new(store));
    let mut ctx = ForwardContext::new(MigrationRun::new().with_backup_id(Some(BACKUP_ID.to_string())));

    let result = deployer.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(repo.backups().list_ids().unwrap(), vec![BACKUP_ID.to_string()]);
    let backup = result.step("backup-creation").unwrap();
    assert_eq!(backup.message, format!("Using existing backup {BACKUP_ID}"));
    assert_eq!(status_of(&ctx, "backup:metadata"), Some(HealthStatus::Pass));
}

#[tokio::test]
async fn unknown_backup_id_fails_backup_validation() {
    let repo = RepoFixture::migrated();
    let deployer = deployer(&repo, Arc::new(MemoryDataStore::new()));
    let mut ctx = ForwardContext::new(MigrationRun::new().with_backup_id(Some("does-not-exist".to_string())));

    let err = deployer.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "backup-creation");
    assert_eq!(status_of(&ctx, "backup:metadata"), Some(HealthStatus::Fail));
}

#[tokio::test]
async fn missing_fallback_workflow_only_warns() {
    let repo = RepoFixture::migrated();
    repo.remove(".github/workflows/fallback-audit.yml");
    let deployer = deployer(&repo, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new().dry_run(true));

    let result = deployer.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(status_of(&ctx, "health:fallback-workflow"), Some(HealthStatus::Warning));
    assert!(!ctx.fallbacks.is_registered("audit-complete"));
}

#[tokio::test]
async fn dispatch_credentials_register_the_fallback() {
    let repo = RepoFixture::migrated();
    let settings = Settings::default();
    let layout = settings.paths.layout(repo.root());
    let env = Environment::from_pairs(
        STORE_ENV
            .into_iter()
            .chain([("GITHUB_TOKEN", "ghp_test"), ("GITHUB_REPOSITORY", "acme/books")]),
    );
    let deployer = MigrationDeployer::new(settings, layout, env, Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new().dry_run(true));

    deployer.execute(&mut ctx).await.unwrap();

    assert!(ctx.fallbacks.is_registered("audit-complete"));
    assert_eq!(status_of(&ctx, "health:fallback-workflow"), Some(HealthStatus::Pass));
}

#[tokio::test]
async fn critical_load_fails_health_checks() {
    let repo = RepoFixture::migrated();
    let mut settings = Settings::default();
    settings.degradation.simulated_usage.memory_usage = 95.0;
    let layout = settings.paths.layout(repo.root());
    let deployer = MigrationDeployer::new(settings, layout, Environment::from_pairs(STORE_ENV), Arc::new(seeded_store()));
    let mut ctx = ForwardContext::new(MigrationRun::new().dry_run(true));

    let err = deployer.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "health-checks");
    assert_eq!(ctx.service_level, Some(ServiceLevel::Minimal));
    assert_eq!(status_of(&ctx, "health:service-level"), Some(HealthStatus::Fail));
}
