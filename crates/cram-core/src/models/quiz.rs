//! Quiz model

use serde::{Deserialize, Serialize};

use super::ids::{QuizId, UserId};

/// A quiz owned by one user.
///
/// The question payload is opaque to this crate; authoring and validation
/// happen in the import layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    /// Unique identifier
    pub id: QuizId,
    /// Owning user
    pub user_id: UserId,
    /// Display title
    pub title: String,
    /// Question payload as authored
    pub questions: serde_json::Value,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag for sync
    pub is_deleted: bool,
    /// Whether the current values are confirmed by the remote store
    pub synced: bool,
}

impl Quiz {
    /// Create a new, unsynced quiz
    #[must_use]
    pub fn new(user_id: UserId, title: impl Into<String>, questions: serde_json::Value) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: QuizId::new(),
            user_id,
            title: title.into(),
            questions,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            synced: false,
        }
    }

    /// Number of questions when the payload is a JSON array
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.as_array().map_or(0, Vec::len)
    }

    /// Check the invariants a received quiz must hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("quiz title is empty".to_string());
        }
        if self.updated_at < self.created_at {
            return Err(format!(
                "updated_at {} precedes created_at {}",
                self.updated_at, self.created_at
            ));
        }
        Ok(())
    }
}
