//! Rows as JSON objects

use serde_json::{Map, Value};

/// One table row
pub type Row = Map<String, Value>;

/// Copy rows without their identity field so the store assigns fresh ones
#[must_use]
pub fn strip_identity(rows: &[Row], field: &str) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            row.remove(field);
            row
        })
        .collect()
}

/// Value of `key` in `row`, rendered for comparison
pub(crate) fn key_of(row: &Row, key: &str) -> Option<String> {
    row.get(key).filter(|v| !v.is_null()).map(Value::to_string)
}
