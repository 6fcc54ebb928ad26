//! SRS state repository implementation

use libsql::{params_from_iter, Connection, Value};

use super::records::{select_all, upsert_statement, TableRecord};
use crate::error::Result;
use crate::models::{QuestionId, SrsState, SrsStats, UserId};

/// Trait for SRS state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SrsRepository {
    /// Get the state of one question for a user
    async fn get(&self, question_id: &QuestionId, user: &UserId) -> Result<Option<SrsState>>;

    /// All states of a user, most recently reviewed first
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<SrsState>>;

    /// States due at `now`, most overdue first
    async fn list_due(&self, user: &UserId, now: i64, limit: usize) -> Result<Vec<SrsState>>;

    /// Apply one review outcome atomically and return the new state
    async fn record_review(
        &self,
        question_id: &QuestionId,
        user: &UserId,
        correct: bool,
        now: i64,
    ) -> Result<SrsState>;

    /// Box distribution, due count and dirty count for a user
    async fn stats(&self, user: &UserId, now: i64) -> Result<SrsStats>;
}

/// libSQL implementation of `SrsRepository`
pub struct LibSqlSrsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSrsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_states(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<SrsState>> {
        let mut rows = conn.query(sql, params_from_iter(params)).await?;
        let mut states = Vec::new();
        while let Some(row) = rows.next().await? {
            states.push(SrsState::from_row(&row)?);
        }
        Ok(states)
    }

    fn key_params(question_id: &QuestionId, user: &UserId) -> Vec<Value> {
        vec![
            Value::Text(question_id.as_str()),
            Value::Text(user.as_str().to_string()),
        ]
    }
}

impl SrsRepository for LibSqlSrsRepository<'_> {
    async fn get(&self, question_id: &QuestionId, user: &UserId) -> Result<Option<SrsState>> {
        let sql = format!("{} WHERE question_id = ? AND user_id = ?", select_all::<SrsState>());
        let mut states =
            Self::query_states(self.conn, &sql, Self::key_params(question_id, user)).await?;
        Ok(states.pop())
    }

    async fn list_for_user(&self, user: &UserId) -> Result<Vec<SrsState>> {
        let sql = format!(
            "{} WHERE user_id = ? ORDER BY last_reviewed DESC",
            select_all::<SrsState>()
        );
        Self::query_states(self.conn, &sql, vec![Value::Text(user.as_str().to_string())]).await
    }

    async fn list_due(&self, user: &UserId, now: i64, limit: usize) -> Result<Vec<SrsState>> {
        let sql = format!(
            "{} WHERE user_id = ? AND next_review <= ? ORDER BY next_review ASC LIMIT ?",
            select_all::<SrsState>()
        );
        Self::query_states(
            self.conn,
            &sql,
            vec![
                Value::Text(user.as_str().to_string()),
                Value::Integer(now),
                Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
            ],
        )
        .await
    }

    async fn record_review(
        &self,
        question_id: &QuestionId,
        user: &UserId,
        correct: bool,
        now: i64,
    ) -> Result<SrsState> {
        let select = format!("{} WHERE question_id = ? AND user_id = ?", select_all::<SrsState>());
        let tx = self.conn.transaction().await?;

        let previous = Self::query_states(&tx, &select, Self::key_params(question_id, user))
            .await?
            .pop();
        let next = SrsState::reviewed(previous.as_ref(), *question_id, user.clone(), correct, now);
        tx.execute(&upsert_statement::<SrsState>(), params_from_iter(next.bind()))
            .await?;
        tx.commit().await?;

        tracing::debug!(
            "Reviewed {question_id}: box {} -> {}",
            previous.as_ref().map_or(0, |state| state.leitner_box),
            next.leitner_box
        );
        Ok(next)
    }

    async fn stats(&self, user: &UserId, now: i64) -> Result<SrsStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT box, COUNT(*),
                        SUM(CASE WHEN next_review <= ? THEN 1 ELSE 0 END),
                        SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END)
                 FROM srs_state WHERE user_id = ? GROUP BY box",
                params_from_iter(vec![
                    Value::Integer(now),
                    Value::Text(user.as_str().to_string()),
                ]),
            )
            .await?;

        let mut stats = SrsStats::default();
        while let Some(row) = rows.next().await? {
            let leitner_box: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            let due: i64 = row.get(2)?;
            let dirty: i64 = row.get(3)?;
            if let Some(slot) = usize::try_from(leitner_box - 1)
                .ok()
                .and_then(|index| stats.per_box.get_mut(index))
            {
                *slot = u64::try_from(count).unwrap_or(0);
            }
            stats.due += u64::try_from(due).unwrap_or(0);
            stats.dirty += u64::try_from(dirty).unwrap_or(0);
        }
        Ok(stats)
    }
}
