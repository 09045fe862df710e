//! SQLite data store
//!
//! Each logical table is a two-column SQLite table: an autoincrement identity
//! and the row as JSON text. Table replacement runs inside a single
//! transaction, so a failure anywhere leaves the previous rows in place.

use crate::error::{check_table_name, DataStoreError};
use crate::row::{key_of, Row};
use crate::store::{DataStore, ReplaceReport};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteDataStore {
    conn: Arc<Mutex<Connection>>,
    identity_field: String,
}

impl SqliteDataStore {
    /// Open (or create) a database file
    ///
    /// # Errors
    /// Propagates SQLite open errors
    pub fn open(path: &Path) -> Result<Self, DataStoreError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Private in-memory database
    ///
    /// # Errors
    /// Propagates SQLite open errors
    pub fn open_in_memory() -> Result<Self, DataStoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            identity_field: "id".to_string(),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, DataStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DataStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| DataStoreError::Connection(format!("sqlite worker failed: {e}")))?
    }
}

fn ensure_table(conn: &Connection, table: &str) -> Result<(), DataStoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\
             rowid_pk INTEGER PRIMARY KEY AUTOINCREMENT, \
             data TEXT NOT NULL\
         )"
    ))?;
    Ok(())
}

fn read_rows(conn: &Connection, table: &str, identity: &str) -> Result<Vec<Row>, DataStoreError> {
    let mut stmt = conn.prepare(&format!("SELECT rowid_pk, data FROM \"{table}\" ORDER BY rowid_pk"))?;
    let raw = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(pk, data)| {
            let mut row: Row = serde_json::from_str(&data)?;
            row.insert(identity.to_string(), Value::from(pk));
            Ok(row)
        })
        .collect()
}

#[async_trait::async_trait]
impl DataStore for SqliteDataStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<(), DataStoreError> {
        self.blocking(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
                .map_err(|e| DataStoreError::Connection(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, DataStoreError> {
        check_table_name(table)?;
        let table = table.to_string();
        let identity = self.identity_field.clone();
        self.blocking(move |conn| {
            ensure_table(conn, &table)?;
            read_rows(conn, &table, &identity)
        })
        .await
    }

    async fn count(&self, table: &str) -> Result<usize, DataStoreError> {
        check_table_name(table)?;
        let table = table.to_string();
        self.blocking(move |conn| {
            ensure_table(conn, &table)?;
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
    }

    async fn replace_all(
        &self,
        table: &str,
        rows: &[Row],
        natural_key: Option<&str>,
    ) -> Result<ReplaceReport, DataStoreError> {
        check_table_name(table)?;
        let table = table.to_string();
        let identity = self.identity_field.clone();
        let natural_key = natural_key.map(str::to_string);
        let rows = rows.to_vec();

        self.blocking(move |conn| {
            ensure_table(conn, &table)?;
            let tx = conn.transaction()?;
            let deleted = tx.execute(&format!("DELETE FROM \"{table}\""), [])?;

            let mut inserted = 0usize;
            {
                let mut insert = tx.prepare(&format!("INSERT INTO \"{table}\" (data) VALUES (?1)"))?;
                let mut find = tx.prepare(&format!(
                    "SELECT rowid_pk FROM \"{table}\" WHERE json_extract(data, '$.' || ?1) = json_extract(?2, '$')"
                ))?;
                let mut update = tx.prepare(&format!("UPDATE \"{table}\" SET data = ?1 WHERE rowid_pk = ?2"))?;

                for row in &rows {
                    let mut row = row.clone();
                    row.remove(&identity);
                    let data = serde_json::to_string(&row)?;

                    let existing: Option<i64> = match natural_key.as_deref() {
                        Some(key) => match key_of(&row, key) {
                            Some(value) => find.query_row(params![key, value], |r| r.get(0)).optional()?,
                            None => None,
                        },
                        None => None,
                    };
                    match existing {
                        Some(pk) => {
                            update.execute(params![data, pk])?;
                        }
                        None => {
                            insert.execute(params![data])?;
                            inserted += 1;
                        }
                    }
                }
            }
            tx.commit()?;

            tracing::debug!("sqlite replaced {}: -{} +{}", table, deleted, inserted);
            Ok(ReplaceReport {
                deleted,
                inserted,
                transactional: true,
            })
        })
        .await
    }
}
