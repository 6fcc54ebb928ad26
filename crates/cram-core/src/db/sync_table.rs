//! Sync-facing view of an entity table

use std::collections::HashMap;
use std::marker::PhantomData;

use libsql::{params_from_iter, Connection, Value};
use uuid::Uuid;

use super::records::{guarded_upsert_statement, select_all, TableRecord};
use crate::error::Result;
use crate::models::UserId;
use crate::sync::SyncEntity;

/// Largest number of ids bound into one `IN (...)` query
const MAX_IN_PARAMS: usize = 500;

/// Durable per-user records with `{synced, updated_at}` dirty tracking,
/// as seen by the push and pull pipelines.
#[allow(async_fn_in_trait)]
pub trait EntityStore<E: SyncEntity> {
    /// All records of `user` with `synced = 0`
    async fn dirty(&self, user: &UserId) -> Result<Vec<E>>;

    /// Local records of `user` among `ids`, keyed by record id
    async fn get_many(&self, user: &UserId, ids: &[Uuid]) -> Result<HashMap<Uuid, E>>;

    /// Write adopted remote records in one transaction, marked synced.
    ///
    /// Each write re-checks last-write-wins against the row as it is at
    /// commit time. Returns the ids left alone because a local write beat
    /// the incoming values in the meantime.
    async fn put_synced(&self, records: &[E]) -> Result<Vec<Uuid>>;

    /// Mark records synced when their `updated_at` still equals the pushed value.
    ///
    /// A record mutated again after it was gathered for push stays dirty.
    /// Returns the number of records marked.
    async fn mark_synced(&self, user: &UserId, confirmed: &[(Uuid, i64)]) -> Result<u64>;
}

/// libSQL implementation of `EntityStore` for any [`TableRecord`]
pub struct SyncTable<'a, E> {
    conn: &'a Connection,
    _entity: PhantomData<E>,
}

impl<'a, E: TableRecord> SyncTable<'a, E> {
    /// Create a new table view with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    async fn query_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<E>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(E::from_row(&row)?);
        }
        Ok(records)
    }

    /// Number of dirty records of `user`
    pub async fn dirty_count(&self, user: &UserId) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = ? AND synced = 0",
            E::TABLE
        );
        let mut rows = self.conn.query(&sql, [user.as_str()]).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl<E: TableRecord> EntityStore<E> for SyncTable<'_, E> {
    async fn dirty(&self, user: &UserId) -> Result<Vec<E>> {
        let sql = format!(
            "{} WHERE user_id = ? AND synced = 0 ORDER BY updated_at ASC",
            select_all::<E>()
        );
        self.query_records(&sql, vec![Value::Text(user.as_str().to_string())])
            .await
    }

    async fn get_many(&self, user: &UserId, ids: &[Uuid]) -> Result<HashMap<Uuid, E>> {
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "{} WHERE user_id = ? AND {} IN ({placeholders})",
                select_all::<E>(),
                E::ID_COLUMN
            );
            let mut params = Vec::with_capacity(chunk.len() + 1);
            params.push(Value::Text(user.as_str().to_string()));
            params.extend(chunk.iter().map(|id| Value::Text(id.to_string())));

            for record in self.query_records(&sql, params).await? {
                found.insert(record.record_id(), record);
            }
        }
        Ok(found)
    }

    async fn put_synced(&self, records: &[E]) -> Result<Vec<Uuid>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let sql = guarded_upsert_statement::<E>();
        let synced_position = E::COLUMNS.iter().position(|column| *column == "synced");
        let tx = self.conn.transaction().await?;
        let mut superseded = Vec::new();
        for record in records {
            let mut values = record.bind();
            if let Some(position) = synced_position {
                values[position] = Value::Integer(1);
            }
            if tx.execute(&sql, params_from_iter(values)).await? == 0 {
                superseded.push(record.record_id());
            }
        }
        tx.commit().await?;

        tracing::debug!(
            "Applied {} remote {} rows, {} superseded locally",
            records.len() - superseded.len(),
            E::KIND,
            superseded.len()
        );
        Ok(superseded)
    }

    async fn mark_synced(&self, user: &UserId, confirmed: &[(Uuid, i64)]) -> Result<u64> {
        if confirmed.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE user_id = ? AND {} = ? AND updated_at = ?",
            E::TABLE,
            E::ID_COLUMN
        );
        let tx = self.conn.transaction().await?;
        let mut marked = 0;
        for (id, updated_at) in confirmed {
            marked += tx
                .execute(
                    &sql,
                    params_from_iter(vec![
                        Value::Text(user.as_str().to_string()),
                        Value::Text(id.to_string()),
                        Value::Integer(*updated_at),
                    ]),
                )
                .await?;
        }
        tx.commit().await?;
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::records::upsert_statement;
    use crate::models::{QuestionId, SrsState};
    use pretty_assertions::assert_eq;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn insert(db: &Database, state: &SrsState) {
        db.connection()
            .execute(&upsert_statement::<SrsState>(), params_from_iter(state.bind()))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dirty_only_returns_unsynced_rows_of_user() {
        let db = Database::open_in_memory().await.unwrap();
        let dirty = SrsState::reviewed(None, QuestionId::new(), user(), true, 10);
        let mut clean = SrsState::reviewed(None, QuestionId::new(), user(), true, 20);
        clean.synced = true;
        let other = SrsState::reviewed(None, QuestionId::new(), UserId::new("x").unwrap(), true, 30);
        for state in [&dirty, &clean, &other] {
            insert(&db, state).await;
        }

        let table = SyncTable::<SrsState>::new(db.connection());
        assert_eq!(table.dirty(&user()).await.unwrap(), vec![dirty]);
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_many_by_id() {
        let db = Database::open_in_memory().await.unwrap();
        let first = SrsState::reviewed(None, QuestionId::new(), user(), true, 10);
        let second = SrsState::reviewed(None, QuestionId::new(), user(), false, 10);
        insert(&db, &first).await;
        insert(&db, &second).await;

        let table = SyncTable::<SrsState>::new(db.connection());
        let missing = Uuid::new_v4();
        let found = table
            .get_many(&user(), &[first.record_id(), missing])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&first.record_id()], first);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_synced_forces_synced_flag() {
        let db = Database::open_in_memory().await.unwrap();
        let state = SrsState::reviewed(None, QuestionId::new(), user(), true, 10);
        let table = SyncTable::<SrsState>::new(db.connection());

        let superseded = table.put_synced(std::slice::from_ref(&state)).await.unwrap();
        assert!(superseded.is_empty());

        let stored = table.get_many(&user(), &[state.record_id()]).await.unwrap();
        assert!(stored[&state.record_id()].synced);
        assert!(table.dirty(&user()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_synced_never_replaces_newer_or_pending_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let table = SyncTable::<SrsState>::new(db.connection());
        let newer_question = QuestionId::new();
        let tied_question = QuestionId::new();

        // Local review at 50 is newer than the incoming one at 10
        let local_newer = SrsState::reviewed(None, newer_question, user(), false, 50);
        insert(&db, &local_newer).await;
        // Pending local review tied with the incoming one
        let local_tied = SrsState::reviewed(None, tied_question, user(), true, 10);
        insert(&db, &local_tied).await;

        let mut incoming_old = SrsState::reviewed(None, newer_question, user(), true, 10);
        incoming_old.leitner_box = 4;
        let mut incoming_tied = SrsState::reviewed(None, tied_question, user(), true, 10);
        incoming_tied.leitner_box = 5;

        let superseded = table
            .put_synced(&[incoming_old, incoming_tied])
            .await
            .unwrap();
        assert_eq!(superseded, vec![*newer_question.as_uuid(), *tied_question.as_uuid()]);

        let stored = table
            .get_many(&user(), &[*newer_question.as_uuid(), *tied_question.as_uuid()])
            .await
            .unwrap();
        assert_eq!(stored[newer_question.as_uuid()], local_newer);
        assert_eq!(stored[tied_question.as_uuid()], local_tied);
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_synced_replaces_synced_tie() {
        let db = Database::open_in_memory().await.unwrap();
        let question = QuestionId::new();
        let mut local = SrsState::reviewed(None, question, user(), true, 10);
        local.synced = true;
        insert(&db, &local).await;

        let mut incoming = local.clone();
        incoming.leitner_box = 3;
        let table = SyncTable::<SrsState>::new(db.connection());
        assert!(table.put_synced(&[incoming]).await.unwrap().is_empty());

        let stored = table.get_many(&user(), &[local.record_id()]).await.unwrap();
        assert_eq!(stored[&local.record_id()].leitner_box, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_requires_unchanged_updated_at() {
        let db = Database::open_in_memory().await.unwrap();
        let question = QuestionId::new();
        let pushed = SrsState::reviewed(None, question, user(), true, 10);
        let newer = SrsState::reviewed(Some(&pushed), question, user(), true, 20);
        insert(&db, &newer).await;

        let table = SyncTable::<SrsState>::new(db.connection());
        let marked = table
            .mark_synced(&user(), &[(pushed.record_id(), pushed.updated_at)])
            .await
            .unwrap();
        assert_eq!(marked, 0);
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 1);

        let marked = table
            .mark_synced(&user(), &[(newer.record_id(), newer.updated_at)])
            .await
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 0);
    }
}
