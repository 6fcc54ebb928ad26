//! Data models for Cram

mod cursor;
mod ids;
mod quiz;
mod quiz_result;
mod srs;
mod sync_conflict;

pub use cursor::{cursor_key, is_valid_cursor_id, SyncCursor, EPOCH_TIMESTAMP, NIL_ID};
pub use ids::{QuestionId, QuizId, ResultId, UserId};
pub use quiz::Quiz;
pub use quiz_result::QuizResult;
pub use srs::{review_interval_ms, SrsState, SrsStats, MAX_BOX, MIN_BOX};
pub use sync_conflict::SyncConflict;
