//! Stored record and metadata
//!
//! The on-disk shape is `{ "meta": { ... }, "data": <document> }`. A file
//! only counts as valid when all three metadata timestamps are present and
//! numeric; any other shape is treated as absent data, never as a fatal
//! parse error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Store metadata. All timestamps are milliseconds since the epoch.
///
/// `last_update` may run ahead of `last_sync` while changes are pending
/// in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Set once, at first load or creation, and never changed again.
    pub create_time: i64,
    /// Advances on every in-memory update.
    pub last_update: i64,
    /// Advances on every completed write to storage.
    pub last_sync: i64,
}

impl Metadata {
    /// Fresh metadata with all three timestamps set to `now`.
    pub fn new(now: i64) -> Self {
        Self {
            create_time: now,
            last_update: now,
            last_sync: now,
        }
    }
}

/// The on-disk representation: metadata plus the serialized document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub meta: Metadata,
    pub data: Value,
}
