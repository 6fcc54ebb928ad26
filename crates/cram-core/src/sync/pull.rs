//! Paginated download of remote changes after the cursor

use serde_json::Value;
use uuid::Uuid;

use super::error::SyncResult;
use super::remote::{row_id, row_updated_at, RemoteStore};
use super::resolver::{resolve, Resolution};
use super::{EntityKind, SyncEntity};
use crate::auth::AuthSession;
use crate::config::SyncSettings;
use crate::db::{CursorStore, EntityStore, NewConflict, SyncConflictRepository};
use crate::models::UserId;
use crate::util::{parse_iso, unix_millis_now};

/// Counts from one pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOutcome {
    pub pulled: usize,
    pub adopted: usize,
    pub kept: usize,
    pub rejected: usize,
    pub pages: usize,
}

/// Collaborators of a pull.
pub struct PullPipeline<'a, L, C, K, R> {
    store: &'a L,
    cursors: &'a C,
    conflicts: &'a K,
    remote: &'a R,
    settings: SyncSettings,
}

/// Result of resolving one page
struct PageOutcome<E> {
    adopt: Vec<E>,
    conflicts: Vec<NewConflict>,
    kept: usize,
    rejected: usize,
}

impl<E> Default for PageOutcome<E> {
    fn default() -> Self {
        Self {
            adopt: Vec::new(),
            conflicts: Vec::new(),
            kept: 0,
            rejected: 0,
        }
    }
}

impl<E: SyncEntity> PageOutcome<E> {
    /// Move adopted records that lost to a concurrent local write over to kept
    fn supersede(&mut self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let kind = E::KIND;
        let (lost, applied): (Vec<E>, Vec<E>) = std::mem::take(&mut self.adopt)
            .into_iter()
            .partition(|record| ids.contains(&record.record_id()));
        self.adopt = applied;
        for record in lost {
            tracing::debug!("Local {kind} write to {} landed during pull, kept", record.record_id());
            self.kept += 1;
            self.conflicts.push(NewConflict {
                entity: kind.to_string(),
                record_id: record.record_id().to_string(),
                local_ts: None,
                incoming_ts: Some(record.lww_timestamp()),
                resolution: Resolution::Keep.as_str().to_string(),
                detail: "local write landed during pull".to_string(),
            });
        }
    }
}

impl<'a, L, C, K, R> PullPipeline<'a, L, C, K, R>
where
    C: CursorStore,
    K: SyncConflictRepository,
    R: RemoteStore,
{
    pub const fn new(
        store: &'a L,
        cursors: &'a C,
        conflicts: &'a K,
        remote: &'a R,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            cursors,
            conflicts,
            remote,
            settings,
        }
    }

    /// Pull pages until one comes back short or the page limit is reached.
    ///
    /// After every page the cursor moves to that page's last row, whatever
    /// the verdicts were.
    pub async fn run<E>(&self, session: &AuthSession, user: &UserId) -> SyncResult<PullOutcome>
    where
        E: SyncEntity,
        L: EntityStore<E>,
    {
        let kind = E::KIND;
        let page_size = self.settings.pull_page_size.max(1);
        let mut outcome = PullOutcome::default();

        for _ in 0..self.settings.max_pull_pages.max(1) {
            let cursor = self.cursors.get(kind.as_str(), user).await?;
            let rows = self
                .remote
                .pull(kind, session, user, &cursor, page_size)
                .await?;
            if rows.is_empty() {
                break;
            }
            outcome.pages += 1;
            outcome.pulled += rows.len();

            let mut page = self.resolve_page::<E>(&rows, user).await?;
            if !page.adopt.is_empty() {
                let superseded = self.store.put_synced(&page.adopt).await?;
                page.supersede(&superseded);
            }
            self.conflicts
                .record(user, &page.conflicts, unix_millis_now())
                .await?;
            outcome.adopted += page.adopt.len();
            outcome.kept += page.kept;
            outcome.rejected += page.rejected;

            let Some((timestamp, last_id)) = page_end(kind, &rows) else {
                // Nothing to move the cursor to; the next cycle starts from the same place
                tracing::warn!(
                    "No {kind} row in a page of {} carries a usable updated_at and {}; stopping pull",
                    rows.len(),
                    kind.remote_id_column()
                );
                return Ok(outcome);
            };
            self.cursors
                .set(kind.as_str(), user, timestamp, &last_id.to_string())
                .await?;
            tracing::debug!(
                "Pulled {} {kind} rows: {} adopted, {} kept, {} rejected; cursor at ({timestamp}, {last_id})",
                rows.len(),
                page.adopt.len(),
                page.kept,
                page.rejected
            );

            if rows.len() < page_size {
                return Ok(outcome);
            }
        }

        if outcome.pages == self.settings.max_pull_pages.max(1) {
            tracing::debug!("Stopped pulling {kind} after {} pages", outcome.pages);
        }
        Ok(outcome)
    }

    async fn resolve_page<E>(&self, rows: &[Value], user: &UserId) -> SyncResult<PageOutcome<E>>
    where
        E: SyncEntity,
        L: EntityStore<E>,
    {
        let kind = E::KIND;
        let decoded: Vec<Result<E, String>> = rows
            .iter()
            .map(|row| {
                E::from_remote(row).and_then(|record| {
                    if record.user_id() == user {
                        Ok(record)
                    } else {
                        Err(format!("row belongs to {}", record.user_id()))
                    }
                })
            })
            .collect();

        let ids: Vec<Uuid> = decoded
            .iter()
            .filter_map(|record| record.as_ref().ok().map(SyncEntity::record_id))
            .collect();
        let locals = self.store.get_many(user, &ids).await?;

        let mut page = PageOutcome::default();
        for (row, record) in rows.iter().zip(decoded) {
            let remote = match record {
                Ok(remote) => remote,
                Err(reason) => {
                    let record_id = row_id(kind, row).map_or_else(String::new, |id| id.to_string());
                    tracing::warn!("Rejected remote {kind} row {record_id}: {reason}");
                    page.rejected += 1;
                    page.conflicts.push(NewConflict {
                        entity: kind.to_string(),
                        record_id,
                        local_ts: None,
                        incoming_ts: None,
                        resolution: Resolution::Reject.as_str().to_string(),
                        detail: reason,
                    });
                    continue;
                }
            };

            let local = locals.get(&remote.record_id());
            match resolve(local, &remote) {
                Resolution::Adopt => page.adopt.push(remote),
                Resolution::Keep => {
                    page.kept += 1;
                    let local_ts = local.map(SyncEntity::lww_timestamp);
                    let detail = if local_ts == Some(remote.lww_timestamp()) {
                        "tie with unsynced local write"
                    } else {
                        "local write is newer"
                    };
                    page.conflicts.push(NewConflict {
                        entity: kind.to_string(),
                        record_id: remote.record_id().to_string(),
                        local_ts,
                        incoming_ts: Some(remote.lww_timestamp()),
                        resolution: Resolution::Keep.as_str().to_string(),
                        detail: detail.to_string(),
                    });
                }
                Resolution::Reject => page.rejected += 1,
            }
        }
        Ok(page)
    }
}

/// Cursor position after a page: the last row carrying a valid `(updated_at, id)`.
fn page_end(kind: EntityKind, rows: &[Value]) -> Option<(&str, Uuid)> {
    rows.iter().rev().find_map(|row| {
        let timestamp = row_updated_at(row).filter(|ts| parse_iso(ts).is_some())?;
        Some((timestamp, row_id(kind, row)?))
    })
}
