//! Testing utilities for the Cutover workspace
//!
//! Repository fixtures laid out the way the default settings expect, seeded
//! stores and seeded backups.

#![allow(missing_docs)]

use cutover_backup::BackupStore;
use cutover_store::{MemoryDataStore, Row};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CONFIG_FILE: &str = "vercel.json";
pub const BACKUPS_DIR: &str = "backups";

pub const ENDPOINT_FILES: [&str; 2] = ["app/api/cron/daily-scan/route.ts", "app/api/cron/validate/route.ts"];

pub const COMPONENT_FILES: [&str; 3] = [
    "app/api/audit/route.ts",
    "lib/monitoring/health.ts",
    "lib/cache/audit-cache.ts",
];

pub const FALLBACK_WORKFLOW: &str = ".github/workflows/fallback-audit.yml";

pub const TABLES: [&str; 6] = [
    "scan_results",
    "validation_results",
    "corrections",
    "requests",
    "audit_history",
    "metrics",
];

pub const STORE_ENV: [(&str, &str); 2] = [
    ("SUPABASE_URL", "sqlite::memory:"),
    ("SUPABASE_SERVICE_ROLE_KEY", "service-role-test-key"),
];

pub const BACKUP_ID: &str = "2026-01-01T00-00-00-000Z";

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub fn tables() -> Vec<String> {
    TABLES.iter().map(ToString::to_string).collect()
}

/// Deployment config declaring `jobs` cron jobs
pub fn deployment_config(jobs: usize) -> String {
    let crons: Vec<Value> = (0..jobs)
        .map(|i| json!({ "path": format!("/api/cron/job-{i}"), "schedule": "0 6 * * *" }))
        .collect();
    serde_json::to_string_pretty(&json!({ "crons": crons })).unwrap()
}

/// A repository checkout in a temporary directory
pub struct RepoFixture {
    dir: TempDir,
}

impl RepoFixture {
    /// Empty repository
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Repository as it looks before a migration: two cron jobs, their
    /// endpoint files, and the fallback workflow
    pub fn current() -> Self {
        let repo = Self::empty();
        repo.write(CONFIG_FILE, &deployment_config(2));
        for rel in ENDPOINT_FILES {
            repo.write(rel, "export async function GET() {}\n");
        }
        repo.write(FALLBACK_WORKFLOW, "on: workflow_dispatch\n");
        repo
    }

    /// [`RepoFixture::current`] plus the new-system components
    pub fn migrated() -> Self {
        let repo = Self::current();
        for rel in COMPONENT_FILES {
            repo.write(rel, "export {};\n");
        }
        repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path(rel)).unwrap();
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn backups(&self) -> BackupStore {
        BackupStore::new(self.path(BACKUPS_DIR))
    }

    /// Files directly inside `rel`, sorted
    pub fn list(&self, rel: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.path(rel)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Snapshot `store` into backup [`BACKUP_ID`]
    pub async fn seed_backup(&self, store: &MemoryDataStore) -> PathBuf {
        self.backups()
            .create(BACKUP_ID, &self.path(CONFIG_FILE), store, &tables())
            .await
            .unwrap()
    }
}

/// Store holding a few rows in most tracked tables (`metrics` stays empty)
pub fn seeded_store() -> MemoryDataStore {
    MemoryDataStore::new()
        .with_table(
            "scan_results",
            vec![
                row(json!({ "url": "/books/a", "score": 92 })),
                row(json!({ "url": "/books/b", "score": 61 })),
            ],
        )
        .with_table("validation_results", vec![row(json!({ "url": "/books/a", "valid": true }))])
        .with_table("corrections", vec![row(json!({ "slug": "alt-text", "applied": false }))])
        .with_table("requests", vec![row(json!({ "path": "/api/audit", "status": 200 }))])
        .with_table(
            "audit_history",
            vec![
                row(json!({ "run": "r1", "passed": 12 })),
                row(json!({ "run": "r2", "passed": 14 })),
                row(json!({ "run": "r3", "passed": 13 })),
            ],
        )
}
