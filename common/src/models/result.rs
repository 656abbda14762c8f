//! Result record written once per batch run.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PayloadPolicy;

/// Message recorded on a successful run.
pub const SUCCESS_MESSAGE: &str = "Batch process completed successfully";

/// Placeholder item count reported under [`PayloadPolicy::ProcessedItems`].
pub const PLACEHOLDER_PROCESSED_ITEMS: u64 = 100;

/// Terminal state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Payload field of the record; the variant name becomes the JSON key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultPayload {
    /// `"processed_items": 100`
    ProcessedItems(u64),
    /// `"query_result": [0]` (the raw result row of the count query)
    QueryResult(Vec<i64>),
}

impl ResultPayload {
    /// Builds the payload for a diagnostic row count under the given policy.
    pub fn from_count(policy: PayloadPolicy, count: i64) -> Self {
        match policy {
            PayloadPolicy::ProcessedItems => ResultPayload::ProcessedItems(PLACEHOLDER_PROCESSED_ITEMS),
            PayloadPolicy::QueryResult => ResultPayload::QueryResult(vec![count]),
        }
    }
}

/// Structured outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: RunStatus,
    /// ISO-8601 construction time (UTC).
    pub timestamp: String,
    pub message: String,
    #[serde(flatten)]
    pub payload: ResultPayload,
}

impl ResultRecord {
    /// Creates a success record stamped with `now`.
    pub fn success(payload: ResultPayload, now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Success,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            message: SUCCESS_MESSAGE.to_string(),
            payload,
        }
    }

    /// Serializes the record to a JSON body.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
