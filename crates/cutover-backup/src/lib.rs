//! Cutover Backup - snapshots and the deployment configuration file
//!
//! - [`BackupStore`]: timestamped snapshot directories with SHA-256 integrity
//! - [`ConfigGateway`]: the live deployment configuration
//! - [`SafetyCopies`]: best-effort copies taken right before a rollback
//!   overwrites anything

pub mod checksum;
pub mod deployment;
pub mod error;
pub mod safety;
pub mod snapshot;

pub use checksum::Checksum;
pub use deployment::ConfigGateway;
pub use error::BackupError;
pub use safety::SafetyCopies;
pub use snapshot::{BackupMetadata, BackupStore, IntegrityReport, TableDump};
