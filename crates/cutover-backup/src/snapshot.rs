//! Backup snapshots
//!
//! Layout under the backups directory:
//!
//! ```text
//! migration-<id>/
//!   vercel.json             copy of the deployment configuration
//!   backup-metadata.json    {timestamp, totalRecords, checksums}
//!   database/<table>.json   {table, data}
//! ```
//!
//! A snapshot is immutable once written. Every read here is side-effect free.

use crate::checksum::Checksum;
use crate::error::BackupError;
use cutover_store::{DataStore, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Directory name prefix of every snapshot
pub const SNAPSHOT_PREFIX: &str = "migration-";
/// Configuration copy inside a snapshot
pub const CONFIG_MEMBER: &str = "vercel.json";
/// Metadata file inside a snapshot
pub const METADATA_MEMBER: &str = "backup-metadata.json";
/// Table dump directory inside a snapshot
pub const DATABASE_MEMBER: &str = "database";
/// Prefix of a snapshot still being written; never listed
const STAGING_PREFIX: &str = ".staging-";

/// `backup-metadata.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    /// When the snapshot was written
    pub timestamp: String,
    /// Row count per table
    pub total_records: BTreeMap<String, usize>,
    /// SHA-256 hex per file, keyed by path relative to the snapshot
    pub checksums: BTreeMap<String, String>,
}

/// `database/<table>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    /// Table name
    pub table: String,
    /// Rows as read from the live store
    pub data: Vec<Row>,
}

/// Outcome of re-hashing a snapshot against its metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Files whose checksum was compared
    pub checked: usize,
    /// Files whose content no longer matches
    pub mismatches: Vec<String>,
    /// Files listed in metadata but absent
    pub missing: Vec<String>,
}

impl IntegrityReport {
    /// No mismatches and nothing missing
    #[inline]
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.mismatches.is_empty() && self.missing.is_empty()
    }
}

/// The backups directory
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Store rooted at `root` (need not exist yet)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Backups directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a snapshot id maps to
    #[must_use]
    pub fn dir_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{SNAPSHOT_PREFIX}{id}"))
    }

    fn check_id(id: &str) -> Result<(), BackupError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(BackupError::InvalidId(id.to_string()));
        }
        Ok(())
    }

    fn check_member(rel: &str) -> Result<(), BackupError> {
        let safe = Path::new(rel)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if rel.is_empty() || !safe {
            return Err(BackupError::UnsafeMember(rel.to_string()));
        }
        Ok(())
    }

    /// Write a new snapshot named `id`
    ///
    /// Copies the configuration file, dumps each table and records checksums
    /// of everything written. Members go into a staging directory that is
    /// renamed into place once the metadata exists, so a failed run leaves
    /// nothing for [`list_ids`](Self::list_ids) to offer. Returns the
    /// snapshot directory.
    ///
    /// # Errors
    /// I/O failures and store read failures
    pub async fn create(
        &self,
        id: &str,
        config_path: &Path,
        store: &dyn DataStore,
        tables: &[String],
    ) -> Result<PathBuf, BackupError> {
        Self::check_id(id)?;
        let dir = self.dir_for(id);
        let staging = self.root.join(format!("{STAGING_PREFIX}{SNAPSHOT_PREFIX}{id}"));

        let written = match Self::write_members(&staging, id, config_path, store, tables).await {
            Ok(()) => tokio::fs::rename(&staging, &dir).await.map_err(BackupError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                tracing::warn!("could not remove partial backup {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        tracing::info!("backup written to {}", dir.display());
        Ok(dir)
    }

    async fn write_members(
        dir: &Path,
        id: &str,
        config_path: &Path,
        store: &dyn DataStore,
        tables: &[String],
    ) -> Result<(), BackupError> {
        let db_dir = dir.join(DATABASE_MEMBER);
        tokio::fs::create_dir_all(&db_dir).await?;

        let mut metadata = BackupMetadata {
            timestamp: id.to_string(),
            ..BackupMetadata::default()
        };

        let config = tokio::fs::read(config_path).await?;
        tokio::fs::write(dir.join(CONFIG_MEMBER), &config).await?;
        metadata
            .checksums
            .insert(CONFIG_MEMBER.to_string(), Checksum::compute(&config).to_hex());

        for table in tables {
            let rows = store.fetch_all(table).await?;
            metadata.total_records.insert(table.clone(), rows.len());
            let dump = TableDump {
                table: table.clone(),
                data: rows,
            };
            let bytes = serde_json::to_vec_pretty(&dump)?;
            let rel = format!("{DATABASE_MEMBER}/{table}.json");
            tokio::fs::write(dir.join(&rel), &bytes).await?;
            metadata.checksums.insert(rel, Checksum::compute(&bytes).to_hex());
            tracing::info!("backed up {} ({} rows)", table, dump.data.len());
        }

        tokio::fs::write(dir.join(METADATA_MEMBER), serde_json::to_vec_pretty(&metadata)?).await?;
        Ok(())
    }

    /// Snapshot ids, oldest first
    ///
    /// # Errors
    /// I/O failures other than a missing backups directory
    pub fn list_ids(&self) -> Result<Vec<String>, BackupError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(SNAPSHOT_PREFIX))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Most recent snapshot id (ids sort chronologically)
    ///
    /// # Errors
    /// See [`list_ids`](Self::list_ids)
    pub fn latest_id(&self) -> Result<Option<String>, BackupError> {
        Ok(self.list_ids()?.pop())
    }

    /// Snapshot directory, which must exist
    ///
    /// # Errors
    /// [`BackupError::NotFound`]
    pub fn open(&self, id: &str) -> Result<PathBuf, BackupError> {
        Self::check_id(id)?;
        let dir = self.dir_for(id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(BackupError::NotFound(dir))
        }
    }

    /// Check the snapshot and its three required members exist
    ///
    /// # Errors
    /// [`BackupError::NotFound`] or the first [`BackupError::MissingMember`]
    pub fn required_members(&self, id: &str) -> Result<PathBuf, BackupError> {
        let dir = self.open(id)?;
        for (member, is_dir) in [(CONFIG_MEMBER, false), (METADATA_MEMBER, false), (DATABASE_MEMBER, true)] {
            let path = dir.join(member);
            let present = if is_dir { path.is_dir() } else { path.is_file() };
            if !present {
                return Err(BackupError::MissingMember { member, path });
            }
        }
        Ok(dir)
    }

    /// Parsed `backup-metadata.json`
    ///
    /// # Errors
    /// Missing snapshot, unreadable or malformed metadata
    pub fn metadata(&self, id: &str) -> Result<BackupMetadata, BackupError> {
        let path = self.open(id)?.join(METADATA_MEMBER);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackupError::MissingMember {
                member: METADATA_MEMBER,
                path: path.clone(),
            },
            _ => e.into(),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Path of the configuration copy
    ///
    /// # Errors
    /// [`BackupError::NotFound`]
    pub fn config_copy(&self, id: &str) -> Result<PathBuf, BackupError> {
        Ok(self.open(id)?.join(CONFIG_MEMBER))
    }

    /// Dump of one table, `None` if the snapshot has none for it
    ///
    /// # Errors
    /// Missing snapshot, unreadable or malformed dump
    pub fn read_dump(&self, id: &str, table: &str) -> Result<Option<TableDump>, BackupError> {
        let path = self.open(id)?.join(DATABASE_MEMBER).join(format!("{table}.json"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-hash every file listed in the metadata
    ///
    /// Pure: the same snapshot always yields the same report.
    ///
    /// # Errors
    /// Missing snapshot or metadata, a checksum entry naming a path outside
    /// the snapshot, and read errors other than not-found
    pub fn verify_integrity(&self, id: &str) -> Result<IntegrityReport, BackupError> {
        let dir = self.open(id)?;
        let metadata = self.metadata(id)?;
        let mut report = IntegrityReport::default();

        for (rel, expected) in &metadata.checksums {
            Self::check_member(rel)?;
            let actual = match Checksum::of_file(&dir.join(rel)) {
                Ok(sum) => sum,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.missing.push(rel.clone());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            report.checked += 1;
            let matches = expected.parse::<Checksum>().map(|e| e == actual).unwrap_or(false);
            if !matches {
                tracing::debug!("checksum mismatch for {}: expected {}, got {}", rel, expected, actual);
                report.mismatches.push(rel.clone());
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backups"));
        (dir, store)
    }

    #[test]
    fn lists_ids_sorted_and_ignores_strays() {
        let (_tmp, backups) = store();
        for name in ["migration-2026-02-01", "migration-2026-01-01", "notes", "migration-x.txt"] {
            if name.ends_with(".txt") {
                std::fs::create_dir_all(backups.root()).unwrap();
                std::fs::write(backups.root().join(name), "").unwrap();
            } else {
                std::fs::create_dir_all(backups.root().join(name)).unwrap();
            }
        }
        assert_eq!(backups.list_ids().unwrap(), vec!["2026-01-01", "2026-02-01"]);
        assert_eq!(backups.latest_id().unwrap().as_deref(), Some("2026-02-01"));
    }

    #[test]
    fn missing_root_lists_nothing() {
        let (_tmp, backups) = store();
        assert!(backups.list_ids().unwrap().is_empty());
        assert!(backups.latest_id().unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_ids() {
        let (_tmp, backups) = store();
        assert!(matches!(backups.open("../etc"), Err(BackupError::InvalidId(_))));
        assert!(matches!(backups.open(""), Err(BackupError::InvalidId(_))));
    }

    #[test]
    fn rejects_checksum_keys_outside_snapshot() {
        for rel in ["../outside.json", "database/../../x", "/etc/passwd", ""] {
            assert!(
                matches!(BackupStore::check_member(rel), Err(BackupError::UnsafeMember(_))),
                "{rel:?} accepted"
            );
        }
        BackupStore::check_member("database/metrics.json").unwrap();
        BackupStore::check_member(CONFIG_MEMBER).unwrap();
    }

    #[test]
    fn required_members_reports_first_missing() {
        let (_tmp, backups) = store();
        let dir = backups.dir_for("a");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_MEMBER), "{}").unwrap();

        match backups.required_members("a") {
            Err(BackupError::MissingMember { member, .. }) => assert_eq!(member, METADATA_MEMBER),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
