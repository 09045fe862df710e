//! Cutover Store - the operational data store collaborator
//!
//! Rollback restores whole tables from JSON dumps. Every backend implements
//! [`DataStore::replace_all`] so that a crash mid-restore never leaves a table
//! in a state a re-run cannot fix:
//! - [`SqliteDataStore`]: delete + insert inside one transaction
//! - [`RestDataStore`]: delete (tolerates empty tables) then insert, upserting
//!   on a natural key when one is configured
//! - [`MemoryDataStore`]: either mode, with injectable failures for tests

pub mod error;
pub mod memory;
pub mod rest;
pub mod row;
pub mod sqlite;
pub mod store;

pub use error::DataStoreError;
pub use memory::{FailOn, MemoryDataStore};
pub use rest::RestDataStore;
pub use row::{strip_identity, Row};
pub use sqlite::SqliteDataStore;
pub use store::{DataStore, ReplaceReport};

use std::path::PathBuf;
use std::sync::Arc;

/// Which backend a data-store URL selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataStoreUrl {
    /// `sqlite::memory:`
    SqliteMemory,
    /// `sqlite://<path>` or `sqlite:<path>`
    Sqlite(PathBuf),
    /// `http://` or `https://` PostgREST endpoint
    Rest(String),
}

impl DataStoreUrl {
    /// Classify a URL
    ///
    /// # Errors
    /// [`DataStoreError::InvalidUrl`] for any other scheme
    pub fn parse(url: &str) -> Result<Self, DataStoreError> {
        let url = url.trim();
        if url == "sqlite::memory:" {
            return Ok(Self::SqliteMemory);
        }
        if let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
            if path.is_empty() {
                return Err(DataStoreError::InvalidUrl(url.to_string()));
            }
            return Ok(Self::Sqlite(PathBuf::from(path)));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Self::Rest(url.trim_end_matches('/').to_string()));
        }
        Err(DataStoreError::InvalidUrl(url.to_string()))
    }
}

/// Connection parameters shared by all backends
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Service credential (REST only)
    pub service_key: String,
    /// Table used by connectivity probes
    pub probe_table: String,
    /// Identity column stripped on restore
    pub identity_field: String,
    /// Tag sent with every REST request for log correlation
    pub request_tag: Option<String>,
}

/// Open the backend a URL selects
///
/// # Errors
/// Invalid URL, unopenable SQLite file, or HTTP client construction failure
pub fn connect(url: &str, options: &ConnectOptions) -> Result<Arc<dyn DataStore>, DataStoreError> {
    let store: Arc<dyn DataStore> = match DataStoreUrl::parse(url)? {
        DataStoreUrl::SqliteMemory => Arc::new(SqliteDataStore::open_in_memory()?),
        DataStoreUrl::Sqlite(path) => Arc::new(SqliteDataStore::open(&path)?),
        DataStoreUrl::Rest(base) => {
            let mut store = RestDataStore::new(base, options.service_key.clone())?
                .with_probe_table(options.probe_table.clone())
                .with_identity_field(options.identity_field.clone());
            if let Some(tag) = &options.request_tag {
                store = store.with_request_tag(tag.clone());
            }
            Arc::new(store)
        }
    };
    tracing::debug!("connected {} data store", store.kind());
    Ok(store)
}
