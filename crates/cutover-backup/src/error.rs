//! Backup and configuration errors

use cutover_core::StageError;
use cutover_store::DataStoreError;
use std::path::PathBuf;

/// Errors from snapshot and configuration access
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// No snapshot directory for the id
    #[error("Backup directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Snapshot directory lacks a required member
    #[error("Backup is missing {member}: {}", .path.display())]
    MissingMember {
        /// Member name (`vercel.json`, `backup-metadata.json`, `database/`)
        member: &'static str,
        /// Expected location
        path: PathBuf,
    },

    /// Deployment configuration is malformed
    #[error("invalid deployment config {}: {reason}", .path.display())]
    InvalidConfig {
        /// Config file
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// Snapshot id cannot name a directory
    #[error("invalid backup id: {0:?}")]
    InvalidId(String),

    /// Metadata names a checksum member outside the snapshot
    #[error("checksum entry escapes the snapshot: {0:?}")]
    UnsafeMember(String),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON artifact
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading live tables failed
    #[error(transparent)]
    Store(#[from] DataStoreError),
}

impl From<BackupError> for StageError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::NotFound(_)
            | BackupError::MissingMember { .. }
            | BackupError::InvalidConfig { .. }
            | BackupError::UnsafeMember(_) => {
                StageError::failed(err.to_string())
            }
            BackupError::Io(e) => StageError::Io(e),
            BackupError::Json(e) => StageError::Json(e),
            BackupError::Store(e) => e.into(),
            BackupError::InvalidId(_) => StageError::collaborator("backup store", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_surfaces_verbatim() {
        let err: StageError = BackupError::NotFound(PathBuf::from("backups/migration-x")).into();
        assert_eq!(err.to_string(), "Backup directory not found: backups/migration-x");
    }
}
