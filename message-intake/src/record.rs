//! The unit of ingestion: one user message keyed by its arrival time.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Key layout used on disk, e.g. `2024-05-01 13:45:10.123456`.
pub const KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A message waiting to be persisted.
///
/// The key doubles as identity and chronological sort order. Two records
/// stamped within the same microsecond share a key, and the later `put`
/// overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub username: String,
    pub message: String,
}

/// The value stored under a record's key in the backing document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub username: String,
    pub message: String,
}

impl Record {
    pub fn new(
        key: impl Into<String>,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            username: username.into(),
            message: message.into(),
        }
    }

    /// Builds a record keyed by the current local time.
    pub fn stamped(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(current_key(), username, message)
    }

    pub fn into_entry(self) -> (String, Entry) {
        let Record {
            key,
            username,
            message,
        } = self;
        (key, Entry { username, message })
    }
}

fn current_key() -> String {
    Local::now().format(KEY_FORMAT).to_string()
}
