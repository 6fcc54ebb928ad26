//! Row mapping between entity tables and models

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::{Quiz, QuizResult, SrsState, UserId};
use crate::sync::SyncEntity;

/// An entity stored in one local table.
pub trait TableRecord: SyncEntity {
    /// Local table name
    const TABLE: &'static str;

    /// Column identifying the record within a user's rows
    const ID_COLUMN: &'static str;

    /// Primary key columns, the upsert conflict target
    const KEY_COLUMNS: &'static [&'static str];

    /// Column compared by last-write-wins
    const LWW_COLUMN: &'static str;

    /// Column list used for every read and write, in `bind` order
    const COLUMNS: &'static [&'static str];

    /// Parse a record from a row selected with [`TableRecord::COLUMNS`]
    fn from_row(row: &Row) -> Result<Self>;

    /// Values for [`TableRecord::COLUMNS`], in order
    fn bind(&self) -> Vec<Value>;
}

/// `SELECT <columns> FROM <table>` for a record type.
pub fn select_all<T: TableRecord>() -> String {
    format!("SELECT {} FROM {}", T::COLUMNS.join(", "), T::TABLE)
}

/// `INSERT OR REPLACE` statement covering every column of a record type.
pub fn upsert_statement<T: TableRecord>() -> String {
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
        T::TABLE,
        T::COLUMNS.join(", ")
    )
}

/// Upsert that only replaces a local row the incoming values beat.
///
/// The incoming row wins when its LWW column is newer, or equal while the
/// local row is synced. Rows of another user are never touched. Evaluated
/// by SQLite per row, so a local write that lands after the caller read
/// the row still wins.
pub fn guarded_upsert_statement<T: TableRecord>() -> String {
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    let assignments = T::COLUMNS
        .iter()
        .filter(|column| !T::KEY_COLUMNS.contains(column))
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let (table, lww) = (T::TABLE, T::LWW_COLUMN);
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})
         ON CONFLICT({}) DO UPDATE SET {assignments}
         WHERE {table}.user_id = excluded.user_id
           AND (excluded.{lww} > {table}.{lww}
                OR (excluded.{lww} = {table}.{lww} AND {table}.synced = 1))",
        T::COLUMNS.join(", "),
        T::KEY_COLUMNS.join(", ")
    )
}

fn parse_user(value: String) -> Result<UserId> {
    UserId::new(value).ok_or_else(|| Error::Database("empty user_id in row".into()))
}

fn parse_id<T: std::str::FromStr>(value: &str, column: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("invalid {column} in row: {value}")))
}

impl TableRecord for SrsState {
    const TABLE: &'static str = "srs_state";
    const ID_COLUMN: &'static str = "question_id";
    const KEY_COLUMNS: &'static [&'static str] = &["question_id", "user_id"];
    const LWW_COLUMN: &'static str = "last_reviewed";
    const COLUMNS: &'static [&'static str] = &[
        "question_id",
        "user_id",
        "box",
        "consecutive_correct",
        "last_reviewed",
        "next_review",
        "synced",
        "updated_at",
    ];

    fn from_row(row: &Row) -> Result<Self> {
        let question_id: String = row.get(0)?;
        Ok(Self {
            question_id: parse_id(&question_id, "question_id")?,
            user_id: parse_user(row.get(1)?)?,
            leitner_box: row.get(2)?,
            consecutive_correct: row.get(3)?,
            last_reviewed: row.get(4)?,
            next_review: row.get(5)?,
            synced: row.get::<i64>(6)? != 0,
            updated_at: row.get(7)?,
        })
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::Text(self.question_id.as_str()),
            Value::Text(self.user_id.as_str().to_string()),
            Value::Integer(self.leitner_box),
            Value::Integer(self.consecutive_correct),
            Value::Integer(self.last_reviewed),
            Value::Integer(self.next_review),
            Value::Integer(i64::from(self.synced)),
            Value::Integer(self.updated_at),
        ]
    }
}

impl TableRecord for Quiz {
    const TABLE: &'static str = "quizzes";
    const ID_COLUMN: &'static str = "id";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const LWW_COLUMN: &'static str = "updated_at";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "title",
        "questions",
        "created_at",
        "updated_at",
        "is_deleted",
        "synced",
    ];

    fn from_row(row: &Row) -> Result<Self> {
        let id: String = row.get(0)?;
        let questions: String = row.get(3)?;
        Ok(Self {
            id: parse_id(&id, "id")?,
            user_id: parse_user(row.get(1)?)?,
            title: row.get(2)?,
            questions: serde_json::from_str(&questions)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            is_deleted: row.get::<i64>(6)? != 0,
            synced: row.get::<i64>(7)? != 0,
        })
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.user_id.as_str().to_string()),
            Value::Text(self.title.clone()),
            Value::Text(self.questions.to_string()),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
            Value::Integer(i64::from(self.is_deleted)),
            Value::Integer(i64::from(self.synced)),
        ]
    }
}

impl TableRecord for QuizResult {
    const TABLE: &'static str = "results";
    const ID_COLUMN: &'static str = "id";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const LWW_COLUMN: &'static str = "updated_at";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "quiz_id",
        "user_id",
        "score",
        "total",
        "completed_at",
        "updated_at",
        "synced",
    ];

    fn from_row(row: &Row) -> Result<Self> {
        let id: String = row.get(0)?;
        let quiz_id: String = row.get(1)?;
        Ok(Self {
            id: parse_id(&id, "id")?,
            quiz_id: parse_id(&quiz_id, "quiz_id")?,
            user_id: parse_user(row.get(2)?)?,
            score: row.get(3)?,
            total: row.get(4)?,
            completed_at: row.get(5)?,
            updated_at: row.get(6)?,
            synced: row.get::<i64>(7)? != 0,
        })
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.quiz_id.as_str()),
            Value::Text(self.user_id.as_str().to_string()),
            Value::Integer(self.score),
            Value::Integer(self.total),
            Value::Integer(self.completed_at),
            Value::Integer(self.updated_at),
            Value::Integer(i64::from(self.synced)),
        ]
    }
}
