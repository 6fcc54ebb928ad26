//! Log of pulled rows that were not adopted

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{params_from_iter, Connection, Value};

use crate::error::Result;
use crate::models::{SyncConflict, UserId};

/// Newest conflicts kept per user; older rows are pruned on every append
pub const CONFLICT_LOG_RETENTION: usize = 500;

/// A conflict about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConflict {
    pub entity: String,
    pub record_id: String,
    pub local_ts: Option<i64>,
    pub incoming_ts: Option<i64>,
    pub resolution: String,
    pub detail: String,
}

/// Trait for conflict log storage (async)
#[allow(async_fn_in_trait)]
pub trait SyncConflictRepository {
    /// Append conflicts of `user` in one transaction, pruning past the retention limit
    async fn record(&self, user: &UserId, conflicts: &[NewConflict], resolved_at: i64)
        -> Result<()>;

    /// Most recent conflicts of `user` first
    async fn list(&self, user: &UserId, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `SyncConflictRepository`
pub struct LibSqlSyncConflictRepository<'a> {
    conn: &'a Connection,
    retention: usize,
}

impl<'a> LibSqlSyncConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            retention: CONFLICT_LOG_RETENTION,
        }
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }
}

fn optional(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

impl SyncConflictRepository for LibSqlSyncConflictRepository<'_> {
    async fn record(
        &self,
        user: &UserId,
        conflicts: &[NewConflict],
        resolved_at: i64,
    ) -> Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().await?;
        for conflict in conflicts {
            tx.execute(
                "INSERT INTO sync_conflicts
                    (user_id, entity, record_id, local_ts, incoming_ts, resolution, detail, resolved_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params_from_iter(vec![
                    Value::Text(user.as_str().to_string()),
                    Value::Text(conflict.entity.clone()),
                    Value::Text(conflict.record_id.clone()),
                    optional(conflict.local_ts),
                    optional(conflict.incoming_ts),
                    Value::Text(conflict.resolution.clone()),
                    Value::Text(conflict.detail.clone()),
                    Value::Integer(resolved_at),
                ]),
            )
            .await?;
        }
        let pruned = tx
            .execute(
                "DELETE FROM sync_conflicts WHERE user_id = ?1 AND id NOT IN (
                     SELECT id FROM sync_conflicts WHERE user_id = ?1
                     ORDER BY resolved_at DESC, id DESC LIMIT ?2
                 )",
                params_from_iter(vec![
                    Value::Text(user.as_str().to_string()),
                    Value::Integer(self.retention as i64),
                ]),
            )
            .await?;
        tx.commit().await?;

        if pruned > 0 {
            tracing::debug!("Pruned {pruned} old sync conflicts for {user}");
        }
        Ok(())
    }

    async fn list(&self, user: &UserId, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity, record_id, local_ts, incoming_ts, resolution, detail, resolved_at
                 FROM sync_conflicts WHERE user_id = ?
                 ORDER BY resolved_at DESC, id DESC LIMIT ?",
                params_from_iter(vec![
                    Value::Text(user.as_str().to_string()),
                    Value::Integer(limit as i64),
                ]),
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                entity: row.get(1)?,
                record_id: row.get(2)?,
                local_ts: row.get(3)?,
                incoming_ts: row.get(4)?,
                resolution: row.get(5)?,
                detail: row.get(6)?,
                resolved_at: row.get(7)?,
            });
        }
        Ok(conflicts)
    }
}
