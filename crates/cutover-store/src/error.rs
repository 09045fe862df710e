//! Data store errors

use cutover_core::StageError;

/// Errors from any data store backend
#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    /// The store could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// A read or write against one table failed
    #[error("{operation} on {table} failed: {message}")]
    Operation {
        /// Table name
        table: String,
        /// `fetch`, `delete`, `insert`, `count`
        operation: &'static str,
        /// Backend message
        message: String,
    },

    /// Table names must be plain identifiers
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// Unsupported or malformed URL
    #[error("invalid data store url: {0}")]
    InvalidUrl(String),

    /// SQLite backend error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Row (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataStoreError {
    /// Build an [`Operation`](Self::Operation) error
    #[inline]
    pub fn operation(table: &str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            table: table.to_string(),
            operation,
            message: message.into(),
        }
    }
}

impl From<DataStoreError> for StageError {
    fn from(err: DataStoreError) -> Self {
        StageError::collaborator("data store", err)
    }
}

/// Reject anything that is not `[A-Za-z_][A-Za-z0-9_]*`
///
/// # Errors
/// [`DataStoreError::InvalidTable`]
pub fn check_table_name(table: &str) -> Result<(), DataStoreError> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DataStoreError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert!(check_table_name("audit_history").is_ok());
        assert!(check_table_name("_t1").is_ok());
        assert!(check_table_name("1abc").is_err());
        assert!(check_table_name("scan results").is_err());
        assert!(check_table_name("x\"; DROP TABLE y; --").is_err());
        assert!(check_table_name("").is_err());
    }

    #[test]
    fn converts_into_stage_error() {
        let err: StageError = DataStoreError::operation("metrics", "insert", "duplicate key").into();
        assert_eq!(err.to_string(), "data store: insert on metrics failed: duplicate key");
    }
}
