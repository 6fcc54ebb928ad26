//! Removal of one user's local data

use libsql::Connection;

use crate::error::Result;
use crate::models::{cursor_key, UserId};
use crate::sync::EntityKind;

/// Per-user tables cleared by [`wipe_user`]
const USER_TABLES: [&str; 3] = ["srs_state", "quizzes", "results"];

/// Delete every local row owned by `user`, including sync cursors and the
/// conflict log, in one transaction.
///
/// Dirty rows are deleted too. Returns the number of entity rows removed.
pub async fn wipe_user(conn: &Connection, user: &UserId) -> Result<u64> {
    let tx = conn.transaction().await?;

    let mut removed = 0;
    for table in USER_TABLES {
        removed += tx
            .execute(&format!("DELETE FROM {table} WHERE user_id = ?"), [user.as_str()])
            .await?;
    }
    for kind in EntityKind::ALL {
        tx.execute(
            "DELETE FROM sync_cursors WHERE table_key = ?",
            [cursor_key(kind.as_str(), user.as_str())],
        )
        .await?;
    }
    tx.execute("DELETE FROM sync_conflicts WHERE user_id = ?", [user.as_str()])
        .await?;

    tx.commit().await?;
    tracing::info!("Wiped {removed} local rows for {user}");
    Ok(removed)
}
