//! In-process remote store with server-side last-write-wins

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::entity::EntityKind;
use super::error::{SyncError, SyncResult};
use super::remote::{row_id, row_updated_at, RemoteStore, UpsertVerdict};
use crate::auth::AuthSession;
use crate::models::{SyncCursor, UserId};
use crate::util::{millis_to_iso, parse_iso, unix_millis_now};

type RowKey = (EntityKind, String, Uuid);

#[derive(Debug, Clone)]
struct StoredRow {
    row: Value,
    lww: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<RowKey, StoredRow>,
    clock: i64,
    upsert_calls: usize,
    pull_calls: usize,
    failures: Option<(usize, u16)>,
}

impl MemoryState {
    /// Server clock: wall time, strictly increasing across writes
    fn tick(&mut self) -> i64 {
        self.clock = (self.clock + 1).max(unix_millis_now());
        self.clock
    }

    fn injected_failure(&mut self) -> SyncResult<()> {
        match self.failures.take() {
            Some((remaining, status)) if remaining > 0 => {
                if remaining > 1 {
                    self.failures = Some((remaining - 1, status));
                }
                Err(SyncError::Api {
                    status,
                    message: "injected failure".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Remote store kept in memory.
///
/// Applies a write iff its LWW timestamp is at least the stored one and
/// stamps applied rows with a server `updated_at`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

fn lww_millis(kind: EntityKind, row: &Value) -> Option<i64> {
    row.get(kind.lww_column())
        .and_then(Value::as_str)
        .and_then(parse_iso)
        .map(|parsed| parsed.timestamp_millis())
}

fn row_user(row: &Value) -> Option<&str> {
    row.get("user_id").and_then(Value::as_str)
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a row exactly as given, bypassing LWW and the server clock.
    ///
    /// The row needs `user_id`, `updated_at` and the kind's id column; other
    /// fields may be anything, including values a client would reject.
    pub fn seed(&self, kind: EntityKind, row: Value) -> SyncResult<()> {
        let id = row_id(kind, &row)
            .ok_or_else(|| SyncError::Protocol(format!("seed row without id: {row}")))?;
        let user = row_user(&row)
            .ok_or_else(|| SyncError::Protocol(format!("seed row without user_id: {row}")))?
            .to_string();
        let updated_at = row_updated_at(&row)
            .and_then(parse_iso)
            .ok_or_else(|| SyncError::Protocol(format!("seed row without updated_at: {row}")))?;
        let lww = lww_millis(kind, &row).unwrap_or(i64::MIN);

        self.state().rows.insert(
            (kind, user, id),
            StoredRow {
                row,
                lww,
                updated_at,
            },
        );
        Ok(())
    }

    /// Fail the next `times` calls with an API error of `status`
    pub fn fail_next(&self, times: usize, status: u16) {
        self.state().failures = Some((times, status));
    }

    pub fn row(&self, kind: EntityKind, user: &UserId, id: Uuid) -> Option<Value> {
        self.state()
            .rows
            .get(&(kind, user.as_str().to_string(), id))
            .map(|stored| stored.row.clone())
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.state()
            .rows
            .keys()
            .filter(|(row_kind, _, _)| *row_kind == kind)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.state().rows.is_empty()
    }

    pub fn upsert_calls(&self) -> usize {
        self.state().upsert_calls
    }

    pub fn pull_calls(&self) -> usize {
        self.state().pull_calls
    }

    /// Every remote call made so far
    pub fn calls(&self) -> usize {
        let state = self.state();
        state.upsert_calls + state.pull_calls
    }
}

impl RemoteStore for MemoryRemote {
    async fn upsert(
        &self,
        kind: EntityKind,
        session: &AuthSession,
        items: &[Value],
    ) -> SyncResult<Vec<UpsertVerdict>> {
        let mut state = self.state();
        state.upsert_calls += 1;
        state.injected_failure()?;

        let mut verdicts = Vec::with_capacity(items.len());
        for item in items {
            let id = row_id(kind, item)
                .ok_or_else(|| SyncError::Protocol(format!("item without id: {item}")))?;
            let lww = lww_millis(kind, item).ok_or_else(|| {
                SyncError::Protocol(format!("item without {}: {item}", kind.lww_column()))
            })?;
            let user = row_user(item).unwrap_or_default();
            if user != session.user.id {
                return Err(SyncError::Api {
                    status: 403,
                    message: format!("row of {user} rejected for {}", session.user.id),
                });
            }

            let key = (kind, user.to_string(), id);
            let applied = state.rows.get(&key).is_none_or(|stored| lww >= stored.lww);
            if applied {
                let server_ts = state.tick();
                let mut row = item.clone();
                row["updated_at"] = Value::String(millis_to_iso(server_ts));
                let updated_at = DateTime::<Utc>::from_timestamp_millis(server_ts)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                state.rows.insert(
                    key,
                    StoredRow {
                        row,
                        lww,
                        updated_at,
                    },
                );
            }
            verdicts.push(UpsertVerdict { id, applied });
        }
        Ok(verdicts)
    }

    async fn pull(
        &self,
        kind: EntityKind,
        _session: &AuthSession,
        user: &UserId,
        cursor: &SyncCursor,
        limit: usize,
    ) -> SyncResult<Vec<Value>> {
        let mut state = self.state();
        state.pull_calls += 1;
        state.injected_failure()?;

        let after_ts = parse_iso(&cursor.last_synced_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let after_id = Uuid::parse_str(&cursor.last_id).unwrap_or(Uuid::nil());

        let mut page: Vec<(DateTime<Utc>, Uuid, &Value)> = state
            .rows
            .iter()
            .filter(|((row_kind, row_user, _), _)| *row_kind == kind && row_user == user.as_str())
            .filter(|((_, _, id), stored)| (stored.updated_at, *id) > (after_ts, after_id))
            .map(|((_, _, id), stored)| (stored.updated_at, *id, &stored.row))
            .collect();
        page.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        Ok(page
            .into_iter()
            .take(limit)
            .map(|(_, _, row)| row.clone())
            .collect())
    }
}
