//! One sync cycle per entity and user

use std::future::Future;

use serde::Serialize;

use super::entity::EntityKind;
use super::error::SyncResult;
use super::guard::{Connectivity, PreconditionGuard, Readiness};
use super::lock::{try_run, LockCoordinator};
use super::pull::PullPipeline;
use super::push::PushPipeline;
use super::remote::RemoteStore;
use crate::auth::{AuthSession, SessionProvider};
use crate::config::{RetryPolicy, SyncSettings};
use crate::db::{Database, LibSqlCursorStore, LibSqlSyncConflictRepository, SyncTable, TableRecord};
use crate::models::{Quiz, QuizResult, SrsState, UserId};

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    SignedOut,
    /// Another cycle for the same entity and user holds the lock
    Locked,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::SignedOut => "signed out",
            Self::Locked => "another sync is running",
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub entity: EntityKind,
    /// The cycle was skipped and should be retried on a later trigger
    pub incomplete: bool,
    pub skipped: Option<SkipReason>,
    pub pushed: usize,
    pub push_stale: usize,
    pub pulled: usize,
    pub adopted: usize,
    pub kept: usize,
    pub rejected: usize,
    pub pages: usize,
}

impl SyncReport {
    fn skipped(entity: EntityKind, reason: SkipReason) -> Self {
        Self {
            entity,
            incomplete: true,
            skipped: Some(reason),
            pushed: 0,
            push_stale: 0,
            pulled: 0,
            adopted: 0,
            kept: 0,
            rejected: 0,
            pages: 0,
        }
    }
}

/// Sequences guard, lock, push, pull and cursor persistence.
pub struct SyncOrchestrator<'a, N, S, L, R> {
    db: &'a Database,
    connectivity: &'a N,
    sessions: &'a S,
    locks: &'a L,
    remote: &'a R,
    settings: SyncSettings,
}

impl<'a, N, S, L, R> SyncOrchestrator<'a, N, S, L, R>
where
    N: Connectivity,
    S: SessionProvider,
    L: LockCoordinator,
    R: RemoteStore,
{
    pub fn new(
        db: &'a Database,
        connectivity: &'a N,
        sessions: &'a S,
        locks: &'a L,
        remote: &'a R,
    ) -> Self {
        Self {
            db,
            connectivity,
            sessions,
            locks,
            remote,
            settings: SyncSettings::default(),
        }
    }

    #[must_use]
    pub const fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run one cycle for `E` on behalf of the session user.
    ///
    /// Offline, signed-out and lock-contended cycles return an incomplete
    /// report without touching the remote store.
    pub async fn sync<E: TableRecord>(&self) -> SyncResult<SyncReport> {
        let kind = E::KIND;
        let (session, user) = match PreconditionGuard::new(self.connectivity, self.sessions)
            .check()
            .await
        {
            Readiness::Ready { session, user } => (session, user),
            Readiness::Offline => {
                tracing::debug!("Skipping {kind} sync: offline");
                return Ok(SyncReport::skipped(kind, SkipReason::Offline));
            }
            Readiness::SignedOut => {
                tracing::debug!("Skipping {kind} sync: signed out");
                return Ok(SyncReport::skipped(kind, SkipReason::SignedOut));
            }
        };

        let lock_name = kind.lock_name(&user);
        match try_run(self.locks, &lock_name, self.locked_cycle::<E>(&session, &user)).await? {
            Some(report) => report,
            None => Ok(SyncReport::skipped(kind, SkipReason::Locked)),
        }
    }

    async fn locked_cycle<E: TableRecord>(
        &self,
        session: &AuthSession,
        user: &UserId,
    ) -> SyncResult<SyncReport> {
        let kind = E::KIND;
        let conn = self.db.connection();
        let table = SyncTable::<E>::new(conn);
        let cursors = LibSqlCursorStore::new(conn);
        let conflicts = LibSqlSyncConflictRepository::new(conn);

        let push = PushPipeline::new(&table, self.remote)
            .run::<E>(session, user)
            .await?;

        cursors.migrate_legacy(kind.as_str(), user).await?;
        let pull = PullPipeline::new(&table, &cursors, &conflicts, self.remote, self.settings)
            .run::<E>(session, user)
            .await?;

        let report = SyncReport {
            entity: kind,
            incomplete: false,
            skipped: None,
            pushed: push.pushed,
            push_stale: push.stale,
            pulled: pull.pulled,
            adopted: pull.adopted,
            kept: pull.kept,
            rejected: pull.rejected,
            pages: pull.pages,
        };
        tracing::info!(
            "Synced {kind} for {user}: pushed {} ({} stale), pulled {} ({} adopted, {} kept, {} rejected)",
            report.pushed,
            report.push_stale,
            report.pulled,
            report.adopted,
            report.kept,
            report.rejected
        );
        Ok(report)
    }

    /// Run one cycle for `kind`
    pub async fn sync_kind(&self, kind: EntityKind) -> SyncResult<SyncReport> {
        match kind {
            EntityKind::Srs => self.sync::<SrsState>().await,
            EntityKind::Quizzes => self.sync::<Quiz>().await,
            EntityKind::Results => self.sync::<QuizResult>().await,
        }
    }

    /// Sync every entity in order, stopping at the first error.
    pub async fn sync_all(&self) -> SyncResult<Vec<SyncReport>> {
        let mut reports = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            reports.push(self.sync_kind(kind).await?);
        }
        Ok(reports)
    }
}

/// Re-run `attempt` after a fixed delay while it fails with a retryable error.
pub async fn run_with_retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(error) if error.is_retryable() && tries < max_attempts => {
                tracing::warn!(
                    "Sync attempt {tries}/{max_attempts} failed, retrying in {:?}: {}",
                    policy.delay,
                    error
                );
                tokio::time::sleep(policy.delay).await;
                tries += 1;
            }
            result => return result,
        }
    }
}
