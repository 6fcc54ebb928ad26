//! Quiz attempt result model

use serde::{Deserialize, Serialize};

use super::ids::{QuizId, ResultId, UserId};

/// Outcome of one completed quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    /// Unique identifier
    pub id: ResultId,
    /// Quiz that was attempted
    pub quiz_id: QuizId,
    /// Owning user
    pub user_id: UserId,
    /// Correct answers
    pub score: i64,
    /// Questions asked
    pub total: i64,
    /// Completion timestamp (Unix ms)
    pub completed_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether the current values are confirmed by the remote store
    pub synced: bool,
}

impl QuizResult {
    /// Record a finished attempt
    #[must_use]
    pub fn new(quiz_id: QuizId, user_id: UserId, score: i64, total: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: ResultId::new(),
            quiz_id,
            user_id,
            score,
            total,
            completed_at: now,
            updated_at: now,
            synced: false,
        }
    }

    /// Score as a fraction in `0.0..=1.0`; an empty attempt scores 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.total <= 0 {
            0.0
        } else {
            self.score as f64 / self.total as f64
        }
    }

    /// Check the invariants a received result must hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.total < 0 {
            return Err(format!("negative total {}", self.total));
        }
        if !(0..=self.total).contains(&self.score) {
            return Err(format!("score {} outside 0..={}", self.score, self.total));
        }
        Ok(())
    }
}
