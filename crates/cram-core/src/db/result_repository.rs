//! Quiz result repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{params_from_iter, Connection, Value};

use super::records::{select_all, upsert_statement, TableRecord};
use crate::error::{Error, Result};
use crate::models::{QuizId, QuizResult, ResultId, UserId};

/// Trait for quiz result storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ResultRepository {
    /// Record a completed attempt
    async fn record(&self, quiz_id: &QuizId, user: &UserId, score: i64, total: i64)
        -> Result<QuizResult>;

    /// Get a result by ID
    async fn get(&self, id: &ResultId) -> Result<Option<QuizResult>>;

    /// A user's results, most recent first
    async fn list_for_user(&self, user: &UserId, limit: usize) -> Result<Vec<QuizResult>>;

    /// A user's results for one quiz, most recent first
    async fn list_for_quiz(&self, user: &UserId, quiz_id: &QuizId) -> Result<Vec<QuizResult>>;
}

/// libSQL implementation of `ResultRepository`
pub struct LibSqlResultRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlResultRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<QuizResult>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(QuizResult::from_row(&row)?);
        }
        Ok(results)
    }
}

impl ResultRepository for LibSqlResultRepository<'_> {
    async fn record(
        &self,
        quiz_id: &QuizId,
        user: &UserId,
        score: i64,
        total: i64,
    ) -> Result<QuizResult> {
        let result = QuizResult::new(*quiz_id, user.clone(), score, total);
        result.validate().map_err(Error::InvalidInput)?;

        self.conn
            .execute(&upsert_statement::<QuizResult>(), params_from_iter(result.bind()))
            .await?;
        Ok(result)
    }

    async fn get(&self, id: &ResultId) -> Result<Option<QuizResult>> {
        let sql = format!("{} WHERE id = ?", select_all::<QuizResult>());
        Ok(self
            .query(&sql, vec![Value::Text(id.as_str())])
            .await?
            .pop())
    }

    async fn list_for_user(&self, user: &UserId, limit: usize) -> Result<Vec<QuizResult>> {
        let sql = format!(
            "{} WHERE user_id = ? ORDER BY completed_at DESC LIMIT ?",
            select_all::<QuizResult>()
        );
        self.query(
            &sql,
            vec![
                Value::Text(user.as_str().to_string()),
                Value::Integer(limit as i64),
            ],
        )
        .await
    }

    async fn list_for_quiz(&self, user: &UserId, quiz_id: &QuizId) -> Result<Vec<QuizResult>> {
        let sql = format!(
            "{} WHERE user_id = ? AND quiz_id = ? ORDER BY completed_at DESC",
            select_all::<QuizResult>()
        );
        self.query(
            &sql,
            vec![
                Value::Text(user.as_str().to_string()),
                Value::Text(quiz_id.as_str()),
            ],
        )
        .await
    }
}
