//! Sync conflict model

use serde::{Deserialize, Serialize};

/// A pulled row that was not adopted locally, recorded for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entity kind (`srs`, `quizzes`, `results`)
    pub entity: String,
    /// Record involved in the conflict
    pub record_id: String,
    /// Local row's LWW timestamp, absent for rejected rows with no local copy
    pub local_ts: Option<i64>,
    /// Incoming row's LWW timestamp, absent when the row could not be decoded
    pub incoming_ts: Option<i64>,
    /// Resolution applied (`keep` or `reject`)
    pub resolution: String,
    /// Human-readable reason
    pub detail: String,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}
