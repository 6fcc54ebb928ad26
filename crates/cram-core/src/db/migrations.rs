//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 4;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_STATEMENTS).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_STATEMENTS).await?;
    }
    if version < 3 {
        apply(conn, 3, &V3_STATEMENTS).await?;
    }
    if version < 4 {
        apply(conn, 4, &V4_STATEMENTS).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: SRS state and sync cursors
const V1_STATEMENTS: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS srs_state (
        question_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        box INTEGER NOT NULL CHECK (box BETWEEN 1 AND 5),
        consecutive_correct INTEGER NOT NULL DEFAULT 0 CHECK (consecutive_correct >= 0),
        last_reviewed INTEGER NOT NULL,
        next_review INTEGER NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (question_id, user_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_srs_state_dirty ON srs_state(user_id, synced)",
    "CREATE INDEX IF NOT EXISTS idx_srs_state_due ON srs_state(user_id, next_review)",
    // One row per "<entity>:<user_id>"; legacy rows are keyed by entity alone
    "CREATE TABLE IF NOT EXISTS sync_cursors (
        table_key TEXT PRIMARY KEY,
        last_synced_at TEXT NOT NULL,
        last_id TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 1
    )",
    "INSERT INTO schema_version (version) VALUES (1)",
];

/// Version 2: quizzes and attempt results
const V2_STATEMENTS: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS quizzes (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        questions TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        synced INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_quizzes_dirty ON quizzes(user_id, synced)",
    "CREATE TABLE IF NOT EXISTS results (
        id TEXT PRIMARY KEY,
        quiz_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        score INTEGER NOT NULL,
        total INTEGER NOT NULL,
        completed_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_results_dirty ON results(user_id, synced)",
    "CREATE INDEX IF NOT EXISTS idx_results_quiz ON results(quiz_id, completed_at DESC)",
    "INSERT INTO schema_version (version) VALUES (2)",
];

/// Version 3: log of pulled rows that were kept or rejected
const V3_STATEMENTS: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS sync_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity TEXT NOT NULL,
        record_id TEXT NOT NULL,
        local_ts INTEGER,
        incoming_ts INTEGER,
        resolution TEXT NOT NULL,
        detail TEXT NOT NULL,
        resolved_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_record ON sync_conflicts(entity, record_id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
    "INSERT INTO schema_version (version) VALUES (3)",
];

/// Version 4: conflict log rows are owned by a user
const V4_STATEMENTS: [&str; 4] = [
    "ALTER TABLE sync_conflicts ADD COLUMN user_id TEXT NOT NULL DEFAULT ''",
    // Rows from before ownership cannot be attributed to anyone
    "DELETE FROM sync_conflicts WHERE user_id = ''",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_user ON sync_conflicts(user_id, resolved_at DESC)",
    "INSERT INTO schema_version (version) VALUES (4)",
];

/// Run one migration's statements inside a transaction
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}/{CURRENT_VERSION}");
    Ok(())
}
