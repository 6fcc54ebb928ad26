//! The remote store as seen by the pipelines

use serde_json::Value;
use uuid::Uuid;

use super::entity::EntityKind;
use super::error::{SyncError, SyncResult};
use crate::auth::AuthSession;
use crate::models::{SyncCursor, UserId};

/// Server answer for one upserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertVerdict {
    pub id: Uuid,
    /// Whether the server applied the write (its stored value was not newer)
    pub applied: bool,
}

/// Authoritative per-user store reached over the network.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// One batched last-write-wins upsert. Returns one verdict per item.
    async fn upsert(
        &self,
        kind: EntityKind,
        session: &AuthSession,
        items: &[Value],
    ) -> SyncResult<Vec<UpsertVerdict>>;

    /// Rows of `user` strictly after `cursor` by `(updated_at, id)`, ascending,
    /// at most `limit` of them.
    async fn pull(
        &self,
        kind: EntityKind,
        session: &AuthSession,
        user: &UserId,
        cursor: &SyncCursor,
        limit: usize,
    ) -> SyncResult<Vec<Value>>;
}

/// Identifier of a remote row, read from the kind's id column.
pub fn row_id(kind: EntityKind, row: &Value) -> Option<Uuid> {
    row.get(kind.remote_id_column())
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// The raw `updated_at` string of a remote row.
pub fn row_updated_at(row: &Value) -> Option<&str> {
    row.get("updated_at").and_then(Value::as_str)
}

/// Decode `[{<id column>, out_updated}]` verdict rows.
pub fn parse_verdicts(kind: EntityKind, rows: &[Value]) -> SyncResult<Vec<UpsertVerdict>> {
    rows.iter()
        .map(|row| {
            let id = row_id(kind, row).ok_or_else(|| {
                SyncError::Protocol(format!(
                    "verdict without a valid {}: {row}",
                    kind.remote_id_column()
                ))
            })?;
            let applied = row
                .get("out_updated")
                .and_then(Value::as_bool)
                .ok_or_else(|| SyncError::Protocol(format!("verdict without out_updated: {row}")))?;
            Ok(UpsertVerdict { id, applied })
        })
        .collect()
}
