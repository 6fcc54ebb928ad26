//! End-to-end sync cycles against an in-memory remote

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use super::*;
use crate::auth::{AuthSession, SessionProvider, StaticSession};
use crate::config::SyncSettings;
use crate::db::{
    CursorStore, Database, EntityStore, LibSqlCursorStore, LibSqlQuizRepository,
    LibSqlSrsRepository, LibSqlSyncConflictRepository, QuizRepository, SrsRepository,
    SyncConflictRepository, SyncTable,
};
use crate::models::{QuestionId, SrsState, SyncCursor, UserId};
use crate::util::millis_to_iso;

const T: i64 = 1_700_000_000_000;

fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

async fn session() -> AuthSession {
    StaticSession::for_user("user-1")
        .current_session()
        .await
        .unwrap()
}

fn srs_row(question: QuestionId, leitner_box: i64, last_reviewed: i64) -> Value {
    json!({
        "question_id": question.as_str(),
        "user_id": "user-1",
        "box": leitner_box,
        "consecutive_correct": leitner_box - 1,
        "last_reviewed": millis_to_iso(last_reviewed),
        "next_review": millis_to_iso(last_reviewed + 3 * 86_400_000),
        "updated_at": millis_to_iso(last_reviewed),
    })
}

/// `EntityStore` that counts batch writes
struct CountingStore<'a, E> {
    inner: SyncTable<'a, E>,
    writes: AtomicUsize,
}

impl<'a> CountingStore<'a, SrsState> {
    fn new(db: &'a Database) -> Self {
        Self {
            inner: SyncTable::new(db.connection()),
            writes: AtomicUsize::new(0),
        }
    }
}

impl EntityStore<SrsState> for CountingStore<'_, SrsState> {
    async fn dirty(&self, user: &UserId) -> crate::Result<Vec<SrsState>> {
        self.inner.dirty(user).await
    }

    async fn get_many(&self, user: &UserId, ids: &[Uuid]) -> crate::Result<HashMap<Uuid, SrsState>> {
        self.inner.get_many(user, ids).await
    }

    async fn put_synced(&self, records: &[SrsState]) -> crate::Result<Vec<Uuid>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_synced(records).await
    }

    async fn mark_synced(&self, user: &UserId, confirmed: &[(Uuid, i64)]) -> crate::Result<u64> {
        self.inner.mark_synced(user, confirmed).await
    }
}

/// `EntityStore` that lets another writer review a question right after
/// the pull has read the local rows
struct RacingStore<'a> {
    inner: SyncTable<'a, SrsState>,
    reviews: LibSqlSrsRepository<'a>,
    question: QuestionId,
    reviewed_at: i64,
}

impl EntityStore<SrsState> for RacingStore<'_> {
    async fn dirty(&self, user: &UserId) -> crate::Result<Vec<SrsState>> {
        self.inner.dirty(user).await
    }

    async fn get_many(&self, user: &UserId, ids: &[Uuid]) -> crate::Result<HashMap<Uuid, SrsState>> {
        let found = self.inner.get_many(user, ids).await?;
        self.reviews
            .record_review(&self.question, user, false, self.reviewed_at)
            .await?;
        Ok(found)
    }

    async fn put_synced(&self, records: &[SrsState]) -> crate::Result<Vec<Uuid>> {
        self.inner.put_synced(records).await
    }

    async fn mark_synced(&self, user: &UserId, confirmed: &[(Uuid, i64)]) -> crate::Result<u64> {
        self.inner.mark_synced(user, confirmed).await
    }
}

/// Remote that answers every upsert with the same verdict
struct ScriptedRemote {
    applied: bool,
    upserts: AtomicUsize,
}

impl RemoteStore for ScriptedRemote {
    async fn upsert(
        &self,
        kind: EntityKind,
        _session: &AuthSession,
        items: &[Value],
    ) -> SyncResult<Vec<UpsertVerdict>> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(items
            .iter()
            .filter_map(|item| item.get(kind.remote_id_column())?.as_str()?.parse::<Uuid>().ok())
            .map(|id| UpsertVerdict {
                id,
                applied: self.applied,
            })
            .collect())
    }

    async fn pull(
        &self,
        _kind: EntityKind,
        _session: &AuthSession,
        _user: &UserId,
        _cursor: &SyncCursor,
        _limit: usize,
    ) -> SyncResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_cycle_is_incomplete_without_remote_calls() {
    let db = Database::open_in_memory().await.unwrap();
    let remote = MemoryRemote::new();
    let connectivity = StaticConnectivity::offline();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();

    let report = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote)
        .sync::<SrsState>()
        .await
        .unwrap();
    assert!(report.incomplete);
    assert_eq!(report.skipped, Some(SkipReason::Offline));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn signed_out_cycle_is_incomplete_without_remote_calls() {
    let db = Database::open_in_memory().await.unwrap();
    let remote = MemoryRemote::new();
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::signed_out();
    let locks = LocalLocks::new();

    let reports = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote)
        .sync_all()
        .await
        .unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|report| report.incomplete));
    assert!(reports
        .iter()
        .all(|report| report.skipped == Some(SkipReason::SignedOut)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn held_lock_skips_cycle_but_other_entities_run() {
    let db = Database::open_in_memory().await.unwrap();
    let remote = MemoryRemote::new();
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();
    let _other_tab = locks
        .try_acquire(&EntityKind::Srs.lock_name(&user()))
        .unwrap()
        .unwrap();

    let orchestrator = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote);
    let srs = orchestrator.sync_kind(EntityKind::Srs).await.unwrap();
    assert!(srs.incomplete);
    assert_eq!(srs.skipped, Some(SkipReason::Locked));
    assert_eq!(remote.calls(), 0);

    let results = orchestrator.sync_kind(EntityKind::Results).await.unwrap();
    assert!(!results.incomplete);
    assert_eq!(remote.pull_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_review_replaces_dirty_local_state() {
    let db = Database::open_in_memory().await.unwrap();
    let question = QuestionId::new();
    let srs = LibSqlSrsRepository::new(db.connection());
    let local = srs
        .record_review(&question, &user(), false, T - 1_000)
        .await
        .unwrap();
    assert_eq!((local.leitner_box, local.synced), (1, false));

    let remote = MemoryRemote::new();
    remote
        .seed(EntityKind::Srs, srs_row(question, 2, T))
        .unwrap();
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();

    let report = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote)
        .sync::<SrsState>()
        .await
        .unwrap();
    assert_eq!(report.push_stale, 1);
    assert_eq!(report.adopted, 1);

    let after = srs.get(&question, &user()).await.unwrap().unwrap();
    assert_eq!(after.leitner_box, 2);
    assert!(after.synced);
    assert_eq!(after.last_reviewed, T);
}

#[tokio::test(flavor = "multi_thread")]
async fn tie_with_unsynced_local_write_is_never_written() {
    let db = Database::open_in_memory().await.unwrap();
    let question = QuestionId::new();
    let srs = LibSqlSrsRepository::new(db.connection());
    let local = srs.record_review(&question, &user(), true, T).await.unwrap();

    let remote = MemoryRemote::new();
    remote
        .seed(EntityKind::Srs, srs_row(question, 4, T))
        .unwrap();

    let store = CountingStore::new(&db);
    let cursors = LibSqlCursorStore::new(db.connection());
    let conflicts = LibSqlSyncConflictRepository::new(db.connection());
    let outcome = PullPipeline::new(&store, &cursors, &conflicts, &remote, SyncSettings::default())
        .run::<SrsState>(&session().await, &user())
        .await
        .unwrap();

    assert_eq!(outcome.kept, 1);
    assert_eq!(outcome.adopted, 0);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(srs.get(&question, &user()).await.unwrap().unwrap(), local);

    // The cursor still moved past the kept row
    let cursor = cursors.get("srs", &user()).await.unwrap();
    assert_eq!(cursor.last_synced_at, millis_to_iso(T));
    assert_eq!(cursor.last_id, question.as_str());

    let logged = conflicts.list(&user(), 10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].resolution, "keep");
    assert_eq!(logged[0].local_ts, Some(T));
}

#[tokio::test(flavor = "multi_thread")]
async fn review_landing_during_pull_is_not_overwritten() {
    let db = Database::open_in_memory().await.unwrap();
    let question = QuestionId::new();
    let remote = MemoryRemote::new();
    remote
        .seed(EntityKind::Srs, srs_row(question, 3, T))
        .unwrap();

    let store = RacingStore {
        inner: SyncTable::new(db.connection()),
        reviews: LibSqlSrsRepository::new(db.connection()),
        question,
        reviewed_at: T + 50_000,
    };
    let cursors = LibSqlCursorStore::new(db.connection());
    let conflicts = LibSqlSyncConflictRepository::new(db.connection());
    let outcome = PullPipeline::new(&store, &cursors, &conflicts, &remote, SyncSettings::default())
        .run::<SrsState>(&session().await, &user())
        .await
        .unwrap();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.kept, 1);

    let after = LibSqlSrsRepository::new(db.connection())
        .get(&question, &user())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.last_reviewed, T + 50_000);
    assert_eq!(after.leitner_box, 1);
    assert!(!after.synced);

    let logged = conflicts.list(&user(), 10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].resolution, "keep");
    assert_eq!(logged[0].incoming_ts, Some(T));
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_push_leaves_record_dirty() {
    let db = Database::open_in_memory().await.unwrap();
    let question = QuestionId::new();
    LibSqlSrsRepository::new(db.connection())
        .record_review(&question, &user(), true, T)
        .await
        .unwrap();

    let remote = ScriptedRemote {
        applied: false,
        upserts: AtomicUsize::new(0),
    };
    let table = SyncTable::<SrsState>::new(db.connection());
    let outcome = PushPipeline::new(&table, &remote)
        .run::<SrsState>(&session().await, &user())
        .await
        .unwrap();

    assert_eq!(remote.upserts.load(Ordering::SeqCst), 1);
    assert_eq!(outcome, PushOutcome { pushed: 0, stale: 1 });
    let dirty = table.dirty(&user()).await.unwrap();
    assert_eq!(dirty.len(), 1);
    assert!(!dirty[0].synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn accepted_push_marks_record_synced() {
    let db = Database::open_in_memory().await.unwrap();
    LibSqlSrsRepository::new(db.connection())
        .record_review(&QuestionId::new(), &user(), true, T)
        .await
        .unwrap();

    let remote = ScriptedRemote {
        applied: true,
        upserts: AtomicUsize::new(0),
    };
    let table = SyncTable::<SrsState>::new(db.connection());
    let outcome = PushPipeline::new(&table, &remote)
        .run::<SrsState>(&session().await, &user())
        .await
        .unwrap();

    assert_eq!(outcome, PushOutcome { pushed: 1, stale: 0 });
    assert_eq!(table.dirty_count(&user()).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_devices_converge() {
    let remote = MemoryRemote::new();
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let question = QuestionId::new();

    let laptop = Database::open_in_memory().await.unwrap();
    let phone = Database::open_in_memory().await.unwrap();
    let laptop_locks = LocalLocks::new();
    let phone_locks = LocalLocks::new();

    LibSqlSrsRepository::new(laptop.connection())
        .record_review(&question, &user(), true, T)
        .await
        .unwrap();
    let quiz = LibSqlQuizRepository::new(laptop.connection())
        .create(&user(), "Capitals", json!([{"q": "Peru?"}]))
        .await
        .unwrap();

    let pushed = SyncOrchestrator::new(&laptop, &connectivity, &sessions, &laptop_locks, &remote)
        .sync_all()
        .await
        .unwrap();
    assert_eq!(pushed[0].pushed, 1);
    assert_eq!(pushed[1].pushed, 1);

    let pulled = SyncOrchestrator::new(&phone, &connectivity, &sessions, &phone_locks, &remote)
        .sync_all()
        .await
        .unwrap();
    assert_eq!(pulled[0].adopted, 1);
    assert_eq!(pulled[1].adopted, 1);

    let on_phone = LibSqlSrsRepository::new(phone.connection())
        .get(&question, &user())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(on_phone.leitner_box, 2);
    assert!(on_phone.synced);
    let quiz_on_phone = LibSqlQuizRepository::new(phone.connection())
        .get(&quiz.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quiz_on_phone.title, "Capitals");

    // A second cycle finds nothing new
    let again = SyncOrchestrator::new(&phone, &connectivity, &sessions, &phone_locks, &remote)
        .sync::<SrsState>()
        .await
        .unwrap();
    assert_eq!((again.pushed, again.pulled), (0, 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_failure_fails_cycle_and_keeps_local_data() {
    let db = Database::open_in_memory().await.unwrap();
    let question = QuestionId::new();
    let srs = LibSqlSrsRepository::new(db.connection());
    srs.record_review(&question, &user(), true, T).await.unwrap();

    let remote = MemoryRemote::new();
    remote.fail_next(1, 503);
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();
    let orchestrator = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote);

    let error = orchestrator.sync::<SrsState>().await.unwrap_err();
    assert!(error.is_retryable());
    assert!(!srs.get(&question, &user()).await.unwrap().unwrap().synced);

    // The lock was released, so the next trigger succeeds
    let report = orchestrator.sync::<SrsState>().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert!(srs.get(&question, &user()).await.unwrap().unwrap().synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn caller_retry_recovers_from_transient_failure() {
    let db = Database::open_in_memory().await.unwrap();
    let remote = MemoryRemote::new();
    remote.fail_next(2, 502);
    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();
    let orchestrator = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote);

    let policy = crate::config::RetryPolicy::default()
        .with_delay(std::time::Duration::from_millis(1));
    let report = run_with_retry(policy, || orchestrator.sync::<SrsState>())
        .await
        .unwrap();
    assert!(!report.incomplete);
    assert_eq!(remote.pull_calls(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_cursor_is_migrated_before_pull() {
    let db = Database::open_in_memory().await.unwrap();
    let old = QuestionId::new();
    let new = QuestionId::new();
    let remote = MemoryRemote::new();
    remote.seed(EntityKind::Srs, srs_row(old, 2, T)).unwrap();
    remote
        .seed(EntityKind::Srs, srs_row(new, 3, T + 5_000))
        .unwrap();

    // Pre-multi-user cursor already past the first row
    db.connection()
        .execute(
            "INSERT INTO sync_cursors (table_key, last_synced_at, last_id, synced) VALUES (?, ?, ?, 1)",
            ["srs".to_string(), millis_to_iso(T), old.as_str()],
        )
        .await
        .unwrap();

    let connectivity = StaticConnectivity::online();
    let sessions = StaticSession::for_user("user-1");
    let locks = LocalLocks::new();
    let report = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote)
        .sync::<SrsState>()
        .await
        .unwrap();
    assert_eq!(report.pulled, 1);

    let cursor = LibSqlCursorStore::new(db.connection())
        .get("srs", &user())
        .await
        .unwrap();
    assert_eq!(cursor.last_id, new.as_str());
}
