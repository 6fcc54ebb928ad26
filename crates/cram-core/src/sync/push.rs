//! Upload of dirty local records

use std::collections::HashMap;

use super::error::{SyncError, SyncResult};
use super::remote::RemoteStore;
use super::SyncEntity;
use crate::auth::AuthSession;
use crate::db::EntityStore;
use crate::models::UserId;

/// Counts from one push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records the server applied
    pub pushed: usize,
    /// Records the server refused because it held a newer value
    pub stale: usize,
}

/// Sends every dirty record of a user in one batched upsert.
pub struct PushPipeline<'a, L, R> {
    store: &'a L,
    remote: &'a R,
}

impl<'a, L, R: RemoteStore> PushPipeline<'a, L, R> {
    pub const fn new(store: &'a L, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Push dirty records and mark the applied ones synced.
    ///
    /// Refused records stay dirty until a pull adopts the server's value.
    pub async fn run<E>(&self, session: &AuthSession, user: &UserId) -> SyncResult<PushOutcome>
    where
        E: SyncEntity,
        L: EntityStore<E>,
    {
        let dirty = self.store.dirty(user).await?;
        if dirty.is_empty() {
            return Ok(PushOutcome::default());
        }

        let items: Vec<_> = dirty.iter().map(SyncEntity::to_remote).collect();
        let verdicts = self.remote.upsert(E::KIND, session, &items).await?;
        if verdicts.len() != items.len() {
            return Err(SyncError::Protocol(format!(
                "{} verdicts for {} {} items",
                verdicts.len(),
                items.len(),
                E::KIND
            )));
        }

        let applied: HashMap<_, _> = verdicts
            .iter()
            .map(|verdict| (verdict.id, verdict.applied))
            .collect();
        let mut confirmed = Vec::new();
        for record in &dirty {
            let id = record.record_id();
            match applied.get(&id) {
                Some(true) => confirmed.push((id, record.updated_at())),
                Some(false) => {}
                None => {
                    return Err(SyncError::Protocol(format!(
                        "no verdict for {} {id}",
                        E::KIND
                    )))
                }
            }
        }

        let marked = self.store.mark_synced(user, &confirmed).await?;
        let outcome = PushOutcome {
            pushed: confirmed.len(),
            stale: dirty.len() - confirmed.len(),
        };
        tracing::debug!(
            "Pushed {} {}: {} applied, {} stale, {} marked synced",
            dirty.len(),
            E::KIND,
            outcome.pushed,
            outcome.stale,
            marked
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SessionProvider, StaticSession};
    use crate::db::{Database, LibSqlSrsRepository, SrsRepository, SyncTable};
    use crate::models::{QuestionId, SrsState};
    use crate::sync::{EntityKind, MemoryRemote, UpsertVerdict};
    use crate::util::millis_to_iso;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    async fn session() -> AuthSession {
        StaticSession::for_user("user-1")
            .current_session()
            .await
            .unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_push_makes_no_remote_call() {
        let db = Database::open_in_memory().await.unwrap();
        let remote = MemoryRemote::new();
        let table = SyncTable::<SrsState>::new(db.connection());

        let outcome = PushPipeline::new(&table, &remote)
            .run::<SrsState>(&session().await, &user())
            .await
            .unwrap();
        assert_eq!(outcome, PushOutcome::default());
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn applied_verdict_marks_synced() {
        let db = Database::open_in_memory().await.unwrap();
        let question = QuestionId::new();
        LibSqlSrsRepository::new(db.connection())
            .record_review(&question, &user(), true, 1_000)
            .await
            .unwrap();
        let remote = MemoryRemote::new();
        let table = SyncTable::<SrsState>::new(db.connection());

        let outcome = PushPipeline::new(&table, &remote)
            .run::<SrsState>(&session().await, &user())
            .await
            .unwrap();
        assert_eq!(outcome, PushOutcome { pushed: 1, stale: 0 });
        assert_eq!(remote.upsert_calls(), 1);
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 0);
        assert!(remote
            .row(EntityKind::Srs, &user(), *question.as_uuid())
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refused_verdict_leaves_record_dirty() {
        let db = Database::open_in_memory().await.unwrap();
        let question = QuestionId::new();
        let local = LibSqlSrsRepository::new(db.connection())
            .record_review(&question, &user(), true, 1_000)
            .await
            .unwrap();

        // Server already holds a newer review of the same question
        let remote = MemoryRemote::new();
        let mut newer = local.to_remote();
        newer["last_reviewed"] = Value::String(millis_to_iso(5_000));
        remote.seed(EntityKind::Srs, newer).unwrap();

        let table = SyncTable::<SrsState>::new(db.connection());
        let outcome = PushPipeline::new(&table, &remote)
            .run::<SrsState>(&session().await, &user())
            .await
            .unwrap();
        assert_eq!(outcome, PushOutcome { pushed: 0, stale: 1 });
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 1);
    }

    struct ShortRemote;

    impl RemoteStore for ShortRemote {
        async fn upsert(
            &self,
            _kind: EntityKind,
            _session: &AuthSession,
            _items: &[Value],
        ) -> SyncResult<Vec<UpsertVerdict>> {
            Ok(Vec::new())
        }

        async fn pull(
            &self,
            _kind: EntityKind,
            _session: &AuthSession,
            _user: &UserId,
            _cursor: &crate::models::SyncCursor,
            _limit: usize,
        ) -> SyncResult<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn verdict_count_mismatch_is_protocol_error() {
        let db = Database::open_in_memory().await.unwrap();
        LibSqlSrsRepository::new(db.connection())
            .record_review(&QuestionId::new(), &user(), false, 1_000)
            .await
            .unwrap();
        let table = SyncTable::<SrsState>::new(db.connection());

        let error = PushPipeline::new(&table, &ShortRemote)
            .run::<SrsState>(&session().await, &user())
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::Protocol(_)));
        assert_eq!(table.dirty_count(&user()).await.unwrap(), 1);
    }
}
