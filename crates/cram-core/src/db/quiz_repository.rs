//! Quiz repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use libsql::{params_from_iter, Connection, Value};

use super::records::{select_all, upsert_statement, TableRecord};
use crate::error::{Error, Result};
use crate::models::{Quiz, QuizId, UserId};

/// Trait for quiz storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QuizRepository {
    /// Create a new quiz
    async fn create(&self, user: &UserId, title: &str, questions: serde_json::Value)
        -> Result<Quiz>;

    /// Get a quiz by ID, including soft-deleted ones
    async fn get(&self, id: &QuizId) -> Result<Option<Quiz>>;

    /// List a user's quizzes (excluding deleted), newest first
    async fn list(&self, user: &UserId, limit: usize, offset: usize) -> Result<Vec<Quiz>>;

    /// Replace a quiz's title and questions
    async fn update(&self, id: &QuizId, title: &str, questions: serde_json::Value)
        -> Result<Quiz>;

    /// Soft delete a quiz
    async fn delete(&self, id: &QuizId) -> Result<()>;
}

/// libSQL implementation of `QuizRepository`
pub struct LibSqlQuizRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQuizRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn save(&self, quiz: &Quiz) -> Result<()> {
        self.conn
            .execute(&upsert_statement::<Quiz>(), params_from_iter(quiz.bind()))
            .await?;
        Ok(())
    }

    fn check_title(title: &str) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("Quiz title cannot be empty".into()));
        }
        Ok(title.to_string())
    }
}

impl QuizRepository for LibSqlQuizRepository<'_> {
    async fn create(
        &self,
        user: &UserId,
        title: &str,
        questions: serde_json::Value,
    ) -> Result<Quiz> {
        let quiz = Quiz::new(user.clone(), Self::check_title(title)?, questions);
        self.save(&quiz).await?;
        Ok(quiz)
    }

    async fn get(&self, id: &QuizId) -> Result<Option<Quiz>> {
        let sql = format!("{} WHERE id = ?", select_all::<Quiz>());
        let mut rows = self.conn.query(&sql, [id.as_str()]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Quiz::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, user: &UserId, limit: usize, offset: usize) -> Result<Vec<Quiz>> {
        let sql = format!(
            "{} WHERE user_id = ? AND is_deleted = 0 ORDER BY updated_at DESC LIMIT ? OFFSET ?",
            select_all::<Quiz>()
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params_from_iter(vec![
                    Value::Text(user.as_str().to_string()),
                    Value::Integer(limit as i64),
                    Value::Integer(offset as i64),
                ]),
            )
            .await?;

        let mut quizzes = Vec::new();
        while let Some(row) = rows.next().await? {
            quizzes.push(Quiz::from_row(&row)?);
        }
        Ok(quizzes)
    }

    async fn update(
        &self,
        id: &QuizId,
        title: &str,
        questions: serde_json::Value,
    ) -> Result<Quiz> {
        let mut quiz = self
            .get(id)
            .await?
            .filter(|quiz| !quiz.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        quiz.title = Self::check_title(title)?;
        quiz.questions = questions;
        quiz.updated_at = chrono::Utc::now().timestamp_millis().max(quiz.updated_at + 1);
        quiz.synced = false;
        self.save(&quiz).await?;
        Ok(quiz)
    }

    async fn delete(&self, id: &QuizId) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let rows = self
            .conn
            .execute(
                "UPDATE quizzes SET is_deleted = 1, synced = 0, updated_at = MAX(updated_at + 1, ?)
                 WHERE id = ? AND is_deleted = 0",
                params_from_iter(vec![Value::Integer(now), Value::Text(id.as_str())]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQuizRepository::new(db.connection());

        let quiz = repo
            .create(&user(), "  Capitals ", json!([{"q": "France?"}]))
            .await
            .unwrap();
        assert_eq!(quiz.title, "Capitals");

        let fetched = repo.get(&quiz.id).await.unwrap().unwrap();
        assert_eq!(fetched, quiz);
        assert!(!fetched.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rejects_blank_title() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQuizRepository::new(db.connection());

        let result = repo.create(&user(), "   ", json!([])).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_marks_dirty() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQuizRepository::new(db.connection());
        let quiz = repo.create(&user(), "Rivers", json!([])).await.unwrap();
        db.connection()
            .execute("UPDATE quizzes SET synced = 1", ())
            .await
            .unwrap();

        let updated = repo
            .update(&quiz.id, "Rivers II", json!([{"q": "Nile?"}]))
            .await
            .unwrap();
        assert_eq!(updated.title, "Rivers II");
        assert_eq!(updated.question_count(), 1);
        assert!(!updated.synced);
        assert!(updated.updated_at >= quiz.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_hides_from_list() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQuizRepository::new(db.connection());
        let kept = repo.create(&user(), "Kept", json!([])).await.unwrap();
        let gone = repo.create(&user(), "Gone", json!([])).await.unwrap();

        repo.delete(&gone.id).await.unwrap();

        let listed = repo.list(&user(), 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);

        let tombstone = repo.get(&gone.id).await.unwrap().unwrap();
        assert!(tombstone.is_deleted);
        assert!(!tombstone.synced);

        assert!(matches!(repo.delete(&gone.id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            repo.update(&gone.id, "Back", json!([])).await,
            Err(Error::NotFound(_))
        ));
    }
}
