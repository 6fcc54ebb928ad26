//! Synchronizable entities and their remote (wire) representation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{QuestionId, Quiz, QuizId, QuizResult, ResultId, SrsState, UserId};

/// The independently synchronized entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Spaced-repetition state
    Srs,
    /// Quizzes
    Quizzes,
    /// Quiz attempt results
    Results,
}

impl EntityKind {
    /// Every kind, in the order a full sync visits them.
    pub const ALL: [Self; 3] = [Self::Srs, Self::Quizzes, Self::Results];

    /// Name used in cursor keys and lock names
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Srs => "srs",
            Self::Quizzes => "quizzes",
            Self::Results => "results",
        }
    }

    /// Remote table holding this entity
    pub const fn remote_table(self) -> &'static str {
        match self {
            Self::Srs => "srs_state",
            Self::Quizzes => "quizzes",
            Self::Results => "results",
        }
    }

    /// Remote column that identifies a row within a user's data.
    ///
    /// Pull pages are ordered by `(updated_at, <id column>)`.
    pub const fn remote_id_column(self) -> &'static str {
        match self {
            Self::Srs => "question_id",
            Self::Quizzes | Self::Results => "id",
        }
    }

    /// Column compared by last-write-wins
    pub const fn lww_column(self) -> &'static str {
        match self {
            Self::Srs => "last_reviewed",
            Self::Quizzes | Self::Results => "updated_at",
        }
    }

    /// Remote procedure performing the batched LWW upsert
    pub const fn upsert_rpc(self) -> &'static str {
        match self {
            Self::Srs => "upsert_srs_state_lww",
            Self::Quizzes => "upsert_quizzes_lww",
            Self::Results => "upsert_results_lww",
        }
    }

    /// Advisory lock name for one sync cycle of this entity and user
    pub fn lock_name(self, user: &UserId) -> String {
        format!("sync-{}-{}", self.as_str(), user.as_str())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "srs" | "srs_state" => Ok(Self::Srs),
            "quizzes" | "quiz" => Ok(Self::Quizzes),
            "results" | "result" => Ok(Self::Results),
            other => Err(format!("unknown entity '{other}'")),
        }
    }
}

/// A record kind the sync engine can push and pull.
///
/// Every implementor carries `{synced, updated_at}` dirty tracking and a
/// last-write-wins timestamp.
pub trait SyncEntity: Clone + Send + Sync + Sized + 'static {
    /// Which table this is
    const KIND: EntityKind;

    /// Identifier of the record within its owner's data
    fn record_id(&self) -> Uuid;

    /// Owning user
    fn user_id(&self) -> &UserId;

    /// Timestamp compared by last-write-wins (Unix ms)
    fn lww_timestamp(&self) -> i64;

    /// Timestamp of the mutation that produced the current values (Unix ms)
    fn updated_at(&self) -> i64;

    /// Whether the remote store has confirmed the current values
    fn is_synced(&self) -> bool;

    /// Full field set sent in the remote upsert
    fn to_remote(&self) -> serde_json::Value;

    /// Decode a pulled row and validate its domain invariants.
    ///
    /// The decoded record is marked synced, since it matches the server.
    fn from_remote(row: &serde_json::Value) -> Result<Self, String>;
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn decode<T: for<'de> Deserialize<'de>>(row: &serde_json::Value) -> Result<T, String> {
    T::deserialize(row).map_err(|error| format!("malformed row: {error}"))
}

fn encode<T: Serialize>(row: &T) -> serde_json::Value {
    // Plain structs of strings, integers and timestamps always serialize
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, Serialize, Deserialize)]
struct SrsStateRow {
    question_id: QuestionId,
    user_id: UserId,
    #[serde(rename = "box")]
    leitner_box: i64,
    consecutive_correct: i64,
    last_reviewed: DateTime<Utc>,
    next_review: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SyncEntity for SrsState {
    const KIND: EntityKind = EntityKind::Srs;

    fn record_id(&self) -> Uuid {
        *self.question_id.as_uuid()
    }

    fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn lww_timestamp(&self) -> i64 {
        self.last_reviewed
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn to_remote(&self) -> serde_json::Value {
        encode(&SrsStateRow {
            question_id: self.question_id,
            user_id: self.user_id.clone(),
            leitner_box: self.leitner_box,
            consecutive_correct: self.consecutive_correct,
            last_reviewed: millis_to_datetime(self.last_reviewed),
            next_review: millis_to_datetime(self.next_review),
            updated_at: millis_to_datetime(self.updated_at),
        })
    }

    fn from_remote(row: &serde_json::Value) -> Result<Self, String> {
        let row: SrsStateRow = decode(row)?;
        let state = Self {
            question_id: row.question_id,
            user_id: row.user_id,
            leitner_box: row.leitner_box,
            consecutive_correct: row.consecutive_correct,
            last_reviewed: row.last_reviewed.timestamp_millis(),
            next_review: row.next_review.timestamp_millis(),
            synced: true,
            updated_at: row.updated_at.timestamp_millis(),
        };
        state.validate()?;
        Ok(state)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QuizRow {
    id: QuizId,
    user_id: UserId,
    title: String,
    questions: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    is_deleted: bool,
}

impl SyncEntity for Quiz {
    const KIND: EntityKind = EntityKind::Quizzes;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn lww_timestamp(&self) -> i64 {
        self.updated_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn to_remote(&self) -> serde_json::Value {
        encode(&QuizRow {
            id: self.id,
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            questions: self.questions.clone(),
            created_at: millis_to_datetime(self.created_at),
            updated_at: millis_to_datetime(self.updated_at),
            is_deleted: self.is_deleted,
        })
    }

    fn from_remote(row: &serde_json::Value) -> Result<Self, String> {
        let row: QuizRow = decode(row)?;
        let quiz = Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            questions: row.questions,
            created_at: row.created_at.timestamp_millis(),
            updated_at: row.updated_at.timestamp_millis(),
            is_deleted: row.is_deleted,
            synced: true,
        };
        quiz.validate()?;
        Ok(quiz)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QuizResultRow {
    id: ResultId,
    quiz_id: QuizId,
    user_id: UserId,
    score: i64,
    total: i64,
    completed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SyncEntity for QuizResult {
    const KIND: EntityKind = EntityKind::Results;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn lww_timestamp(&self) -> i64 {
        self.updated_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn to_remote(&self) -> serde_json::Value {
        encode(&QuizResultRow {
            id: self.id,
            quiz_id: self.quiz_id,
            user_id: self.user_id.clone(),
            score: self.score,
            total: self.total,
            completed_at: millis_to_datetime(self.completed_at),
            updated_at: millis_to_datetime(self.updated_at),
        })
    }

    fn from_remote(row: &serde_json::Value) -> Result<Self, String> {
        let row: QuizResultRow = decode(row)?;
        let result = Self {
            id: row.id,
            quiz_id: row.quiz_id,
            user_id: row.user_id,
            score: row.score,
            total: row.total,
            completed_at: row.completed_at.timestamp_millis(),
            updated_at: row.updated_at.timestamp_millis(),
            synced: true,
        };
        result.validate()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::Srs.as_str(), "srs");
        assert_eq!(EntityKind::Srs.remote_id_column(), "question_id");
        assert_eq!("Quizzes".parse::<EntityKind>().unwrap(), EntityKind::Quizzes);
        assert!("decks".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_lock_names_are_scoped() {
        let user_a = user();
        let user_b = UserId::new("user-2").unwrap();
        assert_eq!(EntityKind::Srs.lock_name(&user_a), "sync-srs-user-1");
        assert_ne!(
            EntityKind::Srs.lock_name(&user_a),
            EntityKind::Results.lock_name(&user_a)
        );
        assert_ne!(
            EntityKind::Srs.lock_name(&user_a),
            EntityKind::Srs.lock_name(&user_b)
        );
    }

    #[test]
    fn test_srs_remote_payload_uses_iso_timestamps() {
        let state = SrsState::reviewed(None, QuestionId::new(), user(), true, 1_500);
        let payload = state.to_remote();
        assert_eq!(payload["box"], 2);
        assert_eq!(payload["updated_at"], "1970-01-01T00:00:01.500Z");
        assert_eq!(payload["question_id"], state.question_id.as_str());
    }

    #[test]
    fn test_srs_from_remote_marks_synced() {
        let question = QuestionId::new();
        let row = json!({
            "question_id": question.as_str(),
            "user_id": "user-1",
            "box": 3,
            "consecutive_correct": 2,
            "last_reviewed": "2024-01-01T00:00:00Z",
            "next_review": "2024-01-08T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00.250+00:00",
            "server_only": "ignored"
        });

        let state = SrsState::from_remote(&row).unwrap();
        assert_eq!(state.question_id, question);
        assert_eq!(state.leitner_box, 3);
        assert!(state.synced);
        assert_eq!(state.updated_at, 1_704_067_200_250);
    }

    #[test]
    fn test_srs_from_remote_rejects_invariant_violation() {
        let row = json!({
            "question_id": QuestionId::new().as_str(),
            "user_id": "user-1",
            "box": 7,
            "consecutive_correct": 2,
            "last_reviewed": "2024-01-01T00:00:00Z",
            "next_review": "2024-01-08T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        assert!(SrsState::from_remote(&row).unwrap_err().contains("box 7"));
    }

    #[test]
    fn test_from_remote_rejects_malformed_rows() {
        assert!(SrsState::from_remote(&json!({"question_id": "nope"})).is_err());
        assert!(Quiz::from_remote(&json!([1, 2, 3])).is_err());
        assert!(QuizResult::from_remote(&json!(null)).is_err());
    }

    #[test]
    fn test_quiz_round_trip_through_remote_shape() {
        let mut quiz = Quiz::new(user(), "Rivers", json!([{"q": "Longest?"}]));
        quiz.created_at = 1_000;
        quiz.updated_at = 2_000;

        let decoded = Quiz::from_remote(&quiz.to_remote()).unwrap();
        assert_eq!(decoded, Quiz { synced: true, ..quiz });
    }

    #[test]
    fn test_result_from_remote_rejects_bad_score() {
        let mut result = QuizResult::new(QuizId::new(), user(), 2, 3);
        let mut payload = result.to_remote();
        payload["score"] = json!(9);
        assert!(QuizResult::from_remote(&payload).is_err());

        result.synced = true;
        result.completed_at = 10;
        result.updated_at = 10;
        assert_eq!(QuizResult::from_remote(&result.to_remote()).unwrap(), result);
    }
}
