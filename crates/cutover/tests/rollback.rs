use async_trait::async_trait;
use cutover::{Environment, MigrationRollback, RollbackContext, Settings};
use cutover_core::{CutoverError, StepStatus};
use cutover_gateway::{EmailMessage, GatewayError, NotificationGateway};
use cutover_store::{DataStore, FailOn, MemoryDataStore};
use cutover_test_utils::{deployment_config, row, seeded_store, RepoFixture, BACKUP_ID, CONFIG_FILE, STORE_ENV};
use serde_json::json;
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::Arc;

mock! {
    pub Gateway {}

    #[async_trait]
    impl NotificationGateway for Gateway {
        async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError>;
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.rollback.pause_secs = 0;
    settings
}

fn rollback(repo: &RepoFixture, store: Arc<MemoryDataStore>) -> MigrationRollback {
    let settings = settings();
    let layout = settings.paths.layout(repo.root());
    let store: Arc<dyn DataStore> = store;
    MigrationRollback::new(settings, layout, Environment::from_pairs(STORE_ENV), store)
}

/// Repository with backup [`BACKUP_ID`] taken, then drifted away from it
async fn drifted_repo(store: &MemoryDataStore) -> RepoFixture {
    let repo = RepoFixture::migrated();
    repo.seed_backup(store).await;
    repo.write(CONFIG_FILE, &deployment_config(5));
    store.replace_all("scan_results", &[], None).await.unwrap();
    repo
}

fn read_log(repo: &RepoFixture, ctx: &RollbackContext) -> serde_json::Value {
    let path = repo.path(&format!("logs/rollback/rollback-{}.json", ctx.run.timestamp));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn missing_backup_aborts_and_persists_the_log() {
    let repo = RepoFixture::migrated();
    let rollback = rollback(&repo, Arc::new(seeded_store()));
    let mut ctx = RollbackContext::new(rollback.run_for("2020-01-01T00-00-00-000Z", false, false));

    let err = rollback.execute(&mut ctx).await.unwrap_err();

    assert!(matches!(err, CutoverError::CriticalStepFailed { ref step, .. } if step == "validate-backup"));
    assert!(err.to_string().contains("Backup directory not found"));
    let partial = err.partial_result();
    assert!(!partial.success);
    assert_eq!(partial.attempted().collect::<Vec<_>>(), vec!["validate-backup"]);
    assert!(partial.steps[0].critical);

    let log = read_log(&repo, &ctx);
    assert_eq!(log["result"]["success"], false);
    assert_eq!(log["config"]["backupId"], "2020-01-01T00-00-00-000Z");
    assert_eq!(log["config"]["force"], false);

    let report = rollback.report(&ctx, partial);
    assert!(report.contains("validate-backup"));
    assert!(!report.contains("restore-database:"));
}

#[tokio::test]
async fn restores_config_and_tables_with_safety_copies() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, false));
    let ts = ctx.run.timestamp.to_string();

    let result = rollback.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(repo.read(CONFIG_FILE), deployment_config(2));
    assert_eq!(store.rows("scan_results").len(), 2);
    assert_eq!(store.rows("audit_history").len(), 3);
    assert!(store.rows("metrics").is_empty());

    // drifted config and live rows were saved before being overwritten
    let safety = "backups/rollback-safety";
    assert_eq!(repo.read(&format!("{safety}/vercel-{ts}.json")), deployment_config(5));
    let saved = repo.list(&format!("{safety}/rollback-{ts}"));
    assert!(saved.contains(&"audit_history.json".to_string()));
    assert!(saved.contains(&"scan_results.json".to_string()));
    assert!(!saved.contains(&"metrics.json".to_string()));

    let notify = result.step("send-notifications").unwrap();
    assert_eq!(notify.status, StepStatus::Skipped);

    assert_eq!(repo.backups().list_ids().unwrap(), vec![BACKUP_ID.to_string()]);
    assert_eq!(read_log(&repo, &ctx)["result"]["success"], true);
}

#[tokio::test]
async fn restored_rows_get_fresh_identities() {
    let store = Arc::new(seeded_store());
    let before: Vec<_> = store.rows("audit_history").iter().map(|r| r["id"].clone()).collect();
    let repo = drifted_repo(&store).await;
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, false));

    rollback.execute(&mut ctx).await.unwrap();

    let after = store.rows("audit_history");
    assert_eq!(after.len(), before.len());
    assert!(after.iter().all(|r| !before.contains(&r["id"])));
    assert_eq!(after[0]["run"], "r1");
}

#[tokio::test]
async fn natural_keys_only_collapse_rows_on_non_transactional_stores() {
    for (store, expected) in [(MemoryDataStore::transactional(), 3), (MemoryDataStore::new(), 2)] {
        let store = Arc::new(store.with_table(
            "scan_results",
            vec![
                row(json!({ "url": "/books/a", "score": 92 })),
                row(json!({ "url": "/books/a", "score": 40 })),
                row(json!({ "url": "/books/b", "score": 61 })),
            ],
        ));
        let repo = drifted_repo(&store).await;

        let mut settings = settings();
        settings.store.natural_keys.insert("scan_results".to_string(), "url".to_string());
        let layout = settings.paths.layout(repo.root());
        let target: Arc<dyn DataStore> = store.clone();
        let rollback = MigrationRollback::new(settings, layout, Environment::from_pairs(STORE_ENV), target);
        let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, false));

        let result = rollback.execute(&mut ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(store.rows("scan_results").len(), expected);
    }
}

#[tokio::test]
async fn forced_table_failure_continues_with_remaining_tables() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    store.fail("audit_history", FailOn::Insert);
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, true, false));

    let result = rollback.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(ctx.failed_tables, vec!["audit_history".to_string()]);
    assert!(ctx.warnings.iter().any(|w| w.contains("audit_history")));
    assert_eq!(store.rows("scan_results").len(), 2);
    assert_eq!(store.rows("requests").len(), 1);

    let restore = result.step("restore-database").unwrap();
    assert_eq!(restore.status, StepStatus::Success);
    assert!(restore.message.contains("failed: audit_history"));
    assert_eq!(result.step("verify-system-health").unwrap().status, StepStatus::Success);
}

#[tokio::test]
async fn forced_unreadable_dump_continues_with_remaining_tables() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    store.replace_all("audit_history", &[], None).await.unwrap();
    repo.write(&format!("backups/migration-{BACKUP_ID}/database/corrections.json"), "{not json");
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, true, false));

    let result = rollback.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(ctx.failed_tables, vec!["corrections".to_string()]);
    assert!(ctx.warnings.iter().any(|w| w.contains("failed to read corrections dump")));
    assert_eq!(store.rows("audit_history").len(), 3);
    assert_eq!(store.rows("scan_results").len(), 2);
    let restore = result.step("restore-database").unwrap();
    assert_eq!(restore.status, StepStatus::Success);
    assert!(restore.message.contains("failed: corrections"));
}

#[tokio::test]
async fn table_failure_without_force_aborts() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    store.fail("audit_history", FailOn::Insert);
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, false));

    let err = rollback.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "restore-database");
    assert!(err.to_string().contains("Failed to restore audit_history"));
    assert!(err.partial_result().step("verify-system-health").is_none());
    assert_eq!(read_log(&repo, &ctx)["result"]["success"], false);
}

#[tokio::test]
async fn tampered_backup_fails_integrity_unless_forced() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    repo.write(
        &format!("backups/migration-{BACKUP_ID}/database/requests.json"),
        r#"{"table":"requests","data":[]}"#,
    );

    let strict = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(strict.run_for(BACKUP_ID, false, false));
    let err = strict.execute(&mut ctx).await.unwrap_err();
    assert_eq!(err.stage(), "validate-backup");
    assert!(err.to_string().contains("Backup integrity check failed"));
    assert!(err.to_string().contains("database/requests.json"));
    assert_eq!(repo.read(CONFIG_FILE), deployment_config(5));

    let forced = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(forced.run_for(BACKUP_ID, true, false));
    let result = forced.execute(&mut ctx).await.unwrap();
    assert!(result.success);
    assert!(ctx.warnings.iter().any(|w| w.contains("ignored: force")));
    assert_eq!(repo.read(CONFIG_FILE), deployment_config(2));
}

#[tokio::test]
async fn missing_endpoint_fails_verification() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    repo.remove("app/api/cron/validate/route.ts");
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, true));

    let err = rollback.execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.stage(), "verify-system-health");
    assert!(err.to_string().contains("app/api/cron/validate/route.ts"));
    assert!(err.partial_result().step("send-notifications").is_none());
}

#[tokio::test]
async fn forced_run_reports_failed_critical_step() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    repo.remove("app/api/cron/validate/route.ts");
    let rollback = rollback(&repo, store.clone());
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, true, false));

    let result = rollback.execute(&mut ctx).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.step("verify-system-health").unwrap().status, StepStatus::Failed);
    assert!(result.errors.iter().any(|e| e.starts_with("verify-system-health:")));
    assert!(result.step("send-notifications").is_some());
}

#[tokio::test]
async fn notify_without_sendgrid_warns() {
    for force in [false, true] {
        let store = Arc::new(seeded_store());
        let repo = drifted_repo(&store).await;
        let rollback = rollback(&repo, store.clone());
        let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, force, true));

        let result = rollback.execute(&mut ctx).await.unwrap();

        assert!(result.success);
        let notify = result.step("send-notifications").unwrap();
        assert_eq!(notify.status, StepStatus::Success);
        assert_eq!(notify.message, "SendGrid not configured");
        assert!(ctx.warnings.contains(&"SendGrid not configured".to_string()));
    }
}

#[tokio::test]
async fn notify_sends_summary_email() {
    let store = Arc::new(seeded_store());
    let repo = drifted_repo(&store).await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_send()
        .withf(|message: &EmailMessage| {
            message.to == "ops@example.com"
                && message.from == "noreply@example.com"
                && message.subject == format!("🚨 Emergency Rollback Completed - {BACKUP_ID}")
                && message.html.contains("restore-database")
        })
        .times(1)
        .returning(|_| Ok(()));
    let rollback = rollback(&repo, store.clone()).with_notifier(Arc::new(gateway), "noreply@example.com");
    let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, false, true));

    let result = rollback.execute(&mut ctx).await.unwrap();

    assert!(result.success);
    assert_eq!(result.step("send-notifications").unwrap().message, "Notified ops@example.com");
}

#[tokio::test]
async fn failed_email_never_fails_the_run() {
    for force in [false, true] {
        let store = Arc::new(seeded_store());
        let repo = drifted_repo(&store).await;
        let mut gateway = MockGateway::new();
        gateway.expect_send().times(1).returning(|_| {
            Err(GatewayError::Api {
                status: 401,
                message: "bad key".to_string(),
            })
        });
        let rollback = rollback(&repo, store.clone()).with_notifier(Arc::new(gateway), "noreply@example.com");
        let mut ctx = RollbackContext::new(rollback.run_for(BACKUP_ID, force, true));

        let result = rollback.execute(&mut ctx).await.unwrap();

        assert!(result.success);
        let notify = result.step("send-notifications").unwrap();
        let expected = if force { StepStatus::Success } else { StepStatus::Failed };
        assert_eq!(notify.status, expected);
        assert!(!notify.critical);
    }
}
