//! Spaced-repetition (Leitner) state model

use serde::{Deserialize, Serialize};

use super::ids::{QuestionId, UserId};

/// Lowest Leitner box: just missed or never answered correctly.
pub const MIN_BOX: i64 = 1;

/// Highest Leitner box: mastered, reviewed at the longest interval.
pub const MAX_BOX: i64 = 5;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Review interval in days, indexed by `box - 1`. Strictly increasing.
const BOX_INTERVAL_DAYS: [i64; 5] = [1, 3, 7, 14, 30];

/// Interval until the next review for a given box, in milliseconds.
///
/// Boxes outside `1..=5` are clamped into range.
#[must_use]
pub fn review_interval_ms(leitner_box: i64) -> i64 {
    let clamped = leitner_box.clamp(MIN_BOX, MAX_BOX);
    // clamped is in 1..=5, the index cannot go out of bounds
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (clamped - 1) as usize;
    BOX_INTERVAL_DAYS[index] * DAY_MS
}

/// Per-user review state of one question.
///
/// Primary key is `(question_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrsState {
    /// Question this state tracks
    pub question_id: QuestionId,
    /// Owning user
    pub user_id: UserId,
    /// Leitner box, `1..=5`
    #[serde(rename = "box")]
    pub leitner_box: i64,
    /// Correct answers in a row, reset to 0 by any miss
    pub consecutive_correct: i64,
    /// Most recent review (Unix ms)
    pub last_reviewed: i64,
    /// When the question is due again (Unix ms)
    pub next_review: i64,
    /// Whether the current values are confirmed by the remote store
    pub synced: bool,
    /// Timestamp of the mutation that produced the current values (Unix ms)
    pub updated_at: i64,
}

impl SrsState {
    /// Apply one review outcome.
    ///
    /// With no prior state the transition starts from an implicit box 0, so a
    /// first correct answer lands in box 2 and a first miss in box 1. The
    /// result is always dirty (`synced = false`) and stamped with `now`.
    #[must_use]
    pub fn reviewed(
        previous: Option<&Self>,
        question_id: QuestionId,
        user_id: UserId,
        correct: bool,
        now: i64,
    ) -> Self {
        let (prior_box, prior_streak) =
            previous.map_or((0, 0), |state| (state.leitner_box, state.consecutive_correct));

        let (leitner_box, consecutive_correct) = if correct {
            let next = if prior_box == 0 { 2 } else { prior_box + 1 };
            (next.min(MAX_BOX), prior_streak + 1)
        } else {
            (MIN_BOX, 0)
        };

        Self {
            question_id,
            user_id,
            leitner_box,
            consecutive_correct,
            last_reviewed: now,
            next_review: now + review_interval_ms(leitner_box),
            synced: false,
            updated_at: now,
        }
    }

    /// Whether the question is due for review at `now`.
    #[must_use]
    pub const fn is_due(&self, now: i64) -> bool {
        self.next_review <= now
    }

    /// Whether the state has reached the top box.
    #[must_use]
    pub const fn is_mastered(&self) -> bool {
        self.leitner_box >= MAX_BOX
    }

    /// Check the domain invariants a persisted or received state must hold.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_BOX..=MAX_BOX).contains(&self.leitner_box) {
            return Err(format!(
                "box {} outside {MIN_BOX}..={MAX_BOX}",
                self.leitner_box
            ));
        }
        if self.consecutive_correct < 0 {
            return Err(format!(
                "negative consecutive_correct {}",
                self.consecutive_correct
            ));
        }
        if self.last_reviewed < 0 || self.updated_at < 0 {
            return Err("negative timestamp".to_string());
        }
        Ok(())
    }
}

/// Box distribution and backlog for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SrsStats {
    /// Number of tracked questions per box, index 0 is box 1
    pub per_box: [u64; 5],
    /// Questions due now
    pub due: u64,
    /// Questions with unsynced changes
    pub dirty: u64,
}

impl SrsStats {
    /// Total number of tracked questions.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.per_box.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn test_first_correct_review_lands_in_box_two() {
        let state = SrsState::reviewed(None, QuestionId::new(), user(), true, 1_000);
        assert_eq!(state.leitner_box, 2);
        assert_eq!(state.consecutive_correct, 1);
        assert_eq!(state.next_review, 1_000 + review_interval_ms(2));
        assert!(!state.synced);
        assert_eq!(state.updated_at, 1_000);
    }

    #[test]
    fn test_first_incorrect_review_lands_in_box_one() {
        let state = SrsState::reviewed(None, QuestionId::new(), user(), false, 1_000);
        assert_eq!(state.leitner_box, 1);
        assert_eq!(state.consecutive_correct, 0);
    }

    #[test]
    fn test_correct_review_caps_at_top_box() {
        let question = QuestionId::new();
        let mut state = SrsState::reviewed(None, question, user(), true, 0);
        for step in 1..10 {
            state = SrsState::reviewed(Some(&state), question, user(), true, step);
        }
        assert_eq!(state.leitner_box, MAX_BOX);
        assert_eq!(state.consecutive_correct, 10);
        assert!(state.is_mastered());
    }

    #[test]
    fn test_incorrect_review_resets() {
        let question = QuestionId::new();
        let mut state = SrsState::reviewed(None, question, user(), true, 0);
        state = SrsState::reviewed(Some(&state), question, user(), true, 1);
        state.synced = true;

        let missed = SrsState::reviewed(Some(&state), question, user(), false, 2);
        assert_eq!(missed.leitner_box, 1);
        assert_eq!(missed.consecutive_correct, 0);
        assert!(!missed.synced);
        assert_eq!(missed.updated_at, 2);
        assert_eq!(missed.last_reviewed, 2);
    }

    #[test]
    fn test_every_transition_matches_box_rule() {
        for prior in MIN_BOX..=MAX_BOX {
            let base = SrsState {
                question_id: QuestionId::new(),
                user_id: user(),
                leitner_box: prior,
                consecutive_correct: 3,
                last_reviewed: 0,
                next_review: 0,
                synced: true,
                updated_at: 0,
            };
            let up = SrsState::reviewed(Some(&base), base.question_id, user(), true, 50);
            assert_eq!(up.leitner_box, (prior + 1).min(MAX_BOX));
            let down = SrsState::reviewed(Some(&base), base.question_id, user(), false, 50);
            assert_eq!(down.leitner_box, 1);
            assert!(!up.synced && !down.synced);
            assert_eq!(up.updated_at, 50);
            assert_eq!(down.updated_at, 50);
        }
    }

    #[test]
    fn test_intervals_strictly_increase() {
        for leitner_box in MIN_BOX..MAX_BOX {
            assert!(review_interval_ms(leitner_box) < review_interval_ms(leitner_box + 1));
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_box() {
        let mut state = SrsState::reviewed(None, QuestionId::new(), user(), true, 0);
        assert!(state.validate().is_ok());
        state.leitner_box = 6;
        assert!(state.validate().is_err());
        state.leitner_box = 0;
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_serializes_box_field_name() {
        let state = SrsState::reviewed(None, QuestionId::new(), user(), true, 0);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["box"], 2);
    }
}
