//! In-memory data store
//!
//! Used by tests and local dry runs. Assigns integer identities on insert and
//! can be told to fail specific operations on specific tables.

use crate::error::{check_table_name, DataStoreError};
use crate::row::{key_of, Row};
use crate::store::{DataStore, ReplaceReport};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Operation to fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailOn {
    /// `fetch_all` / `count`
    Fetch,
    /// the delete half of `replace_all`
    Delete,
    /// the insert half of `replace_all`
    Insert,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Row>>,
    failures: BTreeSet<(String, FailOn)>,
    unreachable: bool,
    next_id: u64,
}

/// Mutex-guarded map of tables
#[derive(Debug)]
pub struct MemoryDataStore {
    state: Mutex<State>,
    identity_field: String,
    transactional: bool,
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataStore {
    /// Non-transactional store (a failed insert leaves the table emptied)
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
            identity_field: "id".to_string(),
            transactional: false,
        }
    }

    /// Transactional store (a failed insert leaves the table untouched)
    #[must_use]
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::new()
        }
    }

    /// Seed `table` with rows (identities assigned where missing)
    #[must_use]
    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        {
            let mut state = self.state.lock();
            let rows = rows
                .into_iter()
                .map(|row| Self::assign_id(&mut state, &self.identity_field, row))
                .collect();
            state.tables.insert(table.to_string(), rows);
        }
        self
    }

    /// Make `op` on `table` fail from now on
    pub fn fail(&self, table: &str, op: FailOn) {
        self.state.lock().failures.insert((table.to_string(), op));
    }

    /// Make every call fail with a connection error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Current rows of `table` (empty if unknown)
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    fn assign_id(state: &mut State, field: &str, mut row: Row) -> Row {
        if !row.contains_key(field) {
            row.insert(field.to_string(), Value::from(state.next_id));
            state.next_id += 1;
        }
        row
    }

    fn guard(state: &State, table: &str, op: FailOn) -> Result<(), DataStoreError> {
        if state.unreachable {
            return Err(DataStoreError::Connection("memory store unreachable".to_string()));
        }
        if state.failures.contains(&(table.to_string(), op)) {
            let name = match op {
                FailOn::Fetch => "fetch",
                FailOn::Delete => "delete",
                FailOn::Insert => "insert",
            };
            return Err(DataStoreError::operation(table, name, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataStore for MemoryDataStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn ping(&self) -> Result<(), DataStoreError> {
        if self.state.lock().unreachable {
            return Err(DataStoreError::Connection("memory store unreachable".to_string()));
        }
        Ok(())
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, DataStoreError> {
        check_table_name(table)?;
        let state = self.state.lock();
        Self::guard(&state, table, FailOn::Fetch)?;
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }

    async fn replace_all(
        &self,
        table: &str,
        rows: &[Row],
        natural_key: Option<&str>,
    ) -> Result<ReplaceReport, DataStoreError> {
        check_table_name(table)?;
        let mut state = self.state.lock();
        Self::guard(&state, table, FailOn::Delete)?;

        let previous = state.tables.insert(table.to_string(), Vec::new()).unwrap_or_default();
        let deleted = previous.len();

        if let Err(e) = Self::guard(&state, table, FailOn::Insert) {
            if self.transactional {
                state.tables.insert(table.to_string(), previous);
            }
            return Err(e);
        }

        let mut fresh: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            let row = Self::assign_id(&mut state, &self.identity_field, row.clone());
            let existing = natural_key.and_then(|key| {
                let value = key_of(&row, key)?;
                fresh.iter().position(|r| key_of(r, key).as_deref() == Some(value.as_str()))
            });
            match existing {
                Some(i) => fresh[i] = row,
                None => fresh.push(row),
            }
        }
        let inserted = fresh.len();
        state.tables.insert(table.to_string(), fresh);

        Ok(ReplaceReport {
            deleted,
            inserted,
            transactional: self.transactional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn replace_assigns_fresh_ids() {
        let store = MemoryDataStore::new().with_table("metrics", vec![row(json!({"name": "old"}))]);
        let report = store
            .replace_all("metrics", &[row(json!({"name": "a"})), row(json!({"name": "b"}))], None)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.inserted, 2);
        let ids: Vec<_> = store.rows("metrics").iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn natural_key_collapses_duplicates() {
        let store = MemoryDataStore::new();
        let rows = [
            row(json!({"url": "a", "v": 1})),
            row(json!({"url": "a", "v": 2})),
            row(json!({"url": "b", "v": 3})),
        ];
        let report = store.replace_all("requests", &rows, Some("url")).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(store.rows("requests")[0]["v"], 2);
    }

    #[tokio::test]
    async fn failed_insert_respects_transactional_mode() {
        let plain = MemoryDataStore::new().with_table("t", vec![row(json!({"x": 1}))]);
        plain.fail("t", FailOn::Insert);
        assert!(plain.replace_all("t", &[], None).await.is_err());
        assert!(plain.rows("t").is_empty());

        let tx = MemoryDataStore::transactional().with_table("t", vec![row(json!({"x": 1}))]);
        tx.fail("t", FailOn::Insert);
        assert!(tx.replace_all("t", &[], None).await.is_err());
        assert_eq!(tx.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_fails_ping() {
        let store = MemoryDataStore::new();
        store.set_unreachable(true);
        assert!(matches!(store.ping().await, Err(DataStoreError::Connection(_))));
    }
}
