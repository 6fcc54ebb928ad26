//! Sync cursor model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::millis_to_iso;

/// Cursor timestamp used before anything has been pulled.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000Z";

/// Cursor id meaning "no prior id".
pub const NIL_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Durable `(timestamp, id)` checkpoint of how far a pull has progressed.
///
/// Rows strictly after `(last_synced_at, last_id)` in ascending order are
/// still to be pulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// ISO-8601 timestamp of the last pulled row
    pub last_synced_at: String,
    /// UUID of the last pulled row, or [`NIL_ID`]
    pub last_id: String,
}

impl SyncCursor {
    /// The starting cursor: epoch timestamp and nil id.
    #[must_use]
    pub fn epoch() -> Self {
        Self {
            last_synced_at: EPOCH_TIMESTAMP.to_string(),
            last_id: NIL_ID.to_string(),
        }
    }

    /// Cursor positioned at a Unix-millisecond timestamp.
    #[must_use]
    pub fn at_millis(millis: i64, last_id: impl Into<String>) -> Self {
        Self {
            last_synced_at: millis_to_iso(millis),
            last_id: last_id.into(),
        }
    }

    /// Whether this cursor has never advanced.
    #[must_use]
    pub fn is_epoch(&self) -> bool {
        self == &Self::epoch()
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::epoch()
    }
}

/// Whether a cursor id is a syntactically valid UUID (the nil UUID included).
#[must_use]
pub fn is_valid_cursor_id(value: &str) -> bool {
    Uuid::parse_str(value.trim()).is_ok()
}

/// Storage key of a cursor: `"<entity>:<user_id>"`.
#[must_use]
pub fn cursor_key(entity: &str, user_id: &str) -> String {
    format!("{entity}:{user_id}")
}
