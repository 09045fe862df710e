//! The data store trait

use crate::error::DataStoreError;
use crate::row::Row;
use serde::Serialize;
use std::fmt::Debug;

/// What a table replacement did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceReport {
    /// Rows removed
    pub deleted: usize,
    /// Rows written
    pub inserted: usize,
    /// Delete and insert committed atomically
    pub transactional: bool,
}

/// Remote relational/document store holding the operational tables
#[async_trait::async_trait]
pub trait DataStore: Send + Sync + Debug {
    /// Backend name for logs
    fn kind(&self) -> &'static str;

    /// Whether [`replace_all`](Self::replace_all) is atomic
    fn supports_transactions(&self) -> bool;

    /// Trivial connectivity read
    async fn ping(&self) -> Result<(), DataStoreError>;

    /// Every row of `table`
    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, DataStoreError>;

    /// Row count of `table`
    async fn count(&self, table: &str) -> Result<usize, DataStoreError> {
        Ok(self.fetch_all(table).await?.len())
    }

    /// Replace the contents of `table` with `rows`
    ///
    /// Re-running with the same rows converges to the same contents, even
    /// after a crash between the delete and the insert. With a
    /// `natural_key`, rows sharing a key collapse to the last one.
    async fn replace_all(
        &self,
        table: &str,
        rows: &[Row],
        natural_key: Option<&str>,
    ) -> Result<ReplaceReport, DataStoreError>;
}
