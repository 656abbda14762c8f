//! Object key derivation for result records.

use std::fmt;

use chrono::{DateTime, Utc};

const KEY_PREFIX: &str = "logs/batch-log-";
const KEY_SUFFIX: &str = ".json";

/// Object key of a result record: `logs/batch-log-<YYYYMMDDHHMMSS>.json`.
///
/// Second resolution only; two runs within the same second share a key
/// and the later write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derives the key for a run started at `at`.
    pub fn for_time(at: DateTime<Utc>) -> Self {
        Self(format!("{}{}{}", KEY_PREFIX, at.format("%Y%m%d%H%M%S"), KEY_SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
