//! Durable per-(entity, user) sync cursors

use chrono::Utc;
use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{cursor_key, is_valid_cursor_id, SyncCursor, UserId, NIL_ID};
use crate::sync::EntityKind;
use crate::util::parse_iso;

/// Trait for sync cursor storage (async)
#[allow(async_fn_in_trait)]
pub trait CursorStore {
    /// Read the cursor for `(entity, user)`, healing corrupt values.
    ///
    /// Returns the epoch cursor when nothing usable is stored.
    async fn get(&self, entity: &str, user: &UserId) -> Result<SyncCursor>;

    /// Persist a cursor after validating both fields.
    async fn set(&self, entity: &str, user: &UserId, timestamp: &str, last_id: &str)
        -> Result<()>;
}

/// libSQL implementation of `CursorStore`
pub struct LibSqlCursorStore<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCursorStore<'a> {
    /// Create a new cursor store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn load(&self, key: &str) -> Result<Option<SyncCursor>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_synced_at, last_id FROM sync_cursors WHERE table_key = ?",
                [key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(SyncCursor {
                last_synced_at: row.get(0)?,
                last_id: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, cursor: &SyncCursor) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_cursors (table_key, last_synced_at, last_id, synced)
                 VALUES (?, ?, ?, 1)
                 ON CONFLICT(table_key) DO UPDATE SET
                     last_synced_at = excluded.last_synced_at,
                     last_id = excluded.last_id,
                     synced = 1",
                [key, cursor.last_synced_at.as_str(), cursor.last_id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Copy a pre-multi-user cursor (keyed by entity alone) to the scoped key.
    ///
    /// Returns `true` when a cursor was migrated. The legacy row is left in
    /// place; an existing scoped cursor is never overwritten.
    pub async fn migrate_legacy(&self, entity: &str, user: &UserId) -> Result<bool> {
        let scoped_key = cursor_key(entity, user.as_str());
        if self.load(&scoped_key).await?.is_some() {
            return Ok(false);
        }
        let Some(legacy) = self.load(entity).await? else {
            return Ok(false);
        };

        let (healed, _) = heal(legacy);
        self.store(&scoped_key, &healed).await?;
        tracing::info!("Migrated legacy {entity} cursor to {scoped_key}");
        Ok(true)
    }

    /// All cursors stored for a user, as `(entity, cursor)` pairs in [`EntityKind::ALL`] order.
    pub async fn list_for_user(&self, user: &UserId) -> Result<Vec<(String, SyncCursor)>> {
        let mut cursors = Vec::new();
        for kind in EntityKind::ALL {
            if let Some(cursor) = self.load(&cursor_key(kind.as_str(), user.as_str())).await? {
                cursors.push((kind.as_str().to_string(), cursor));
            }
        }
        Ok(cursors)
    }
}

impl CursorStore for LibSqlCursorStore<'_> {
    async fn get(&self, entity: &str, user: &UserId) -> Result<SyncCursor> {
        let key = cursor_key(entity, user.as_str());

        if let Some(stored) = self.load(&key).await? {
            let (healed, changed) = heal(stored);
            if changed {
                tracing::warn!(
                    "Healed corrupt sync cursor {key}: now ({}, {})",
                    healed.last_synced_at,
                    healed.last_id
                );
                self.store(&key, &healed).await?;
            }
            return Ok(healed);
        }

        // Read-only fallback for data written before cursors were per-user
        if let Some(legacy) = self.load(entity).await? {
            let (healed, _) = heal(legacy);
            tracing::debug!("Using legacy {entity} cursor for {key}");
            return Ok(healed);
        }

        Ok(SyncCursor::epoch())
    }

    async fn set(
        &self,
        entity: &str,
        user: &UserId,
        timestamp: &str,
        last_id: &str,
    ) -> Result<()> {
        let timestamp = timestamp.trim();
        if parse_iso(timestamp).is_none() {
            return Err(Error::InvalidTimestamp(timestamp.to_string()));
        }
        let last_id = last_id.trim();
        if !is_valid_cursor_id(last_id) {
            return Err(Error::InvalidCursorId(last_id.to_string()));
        }

        let key = cursor_key(entity, user.as_str());
        self.store(
            &key,
            &SyncCursor {
                last_synced_at: timestamp.to_string(),
                last_id: last_id.to_string(),
            },
        )
        .await
    }
}

/// Repair a stored cursor. Returns the usable cursor and whether it changed.
///
/// A timestamp that does not parse or lies in the future resets to the epoch;
/// an id that is not a UUID resets to the nil sentinel.
fn heal(stored: SyncCursor) -> (SyncCursor, bool) {
    let mut cursor = stored;
    let mut changed = false;

    if !is_valid_cursor_id(&cursor.last_id) {
        cursor.last_id = NIL_ID.to_string();
        changed = true;
    }

    match parse_iso(&cursor.last_synced_at) {
        Some(parsed) if parsed <= Utc::now() => {}
        _ => {
            cursor.last_synced_at = SyncCursor::epoch().last_synced_at;
            changed = true;
        }
    }

    (cursor, changed)
}
