//! Run timestamps
//!
//! Sortable and filesystem-safe: `2026-10-17T09-30-12-345Z`. Used for backup
//! ids, log file names and rollback safety copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

const FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Timestamp string fixed at the start of a run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTimestamp(String);

impl RunTimestamp {
    /// Current UTC time
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Format a given instant
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(FORMAT).to_string())
    }

    /// Borrow as `&str`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunTimestamp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
