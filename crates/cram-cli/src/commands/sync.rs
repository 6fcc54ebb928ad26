use std::path::Path;
use std::time::Duration;

use cram_core::db::{
    Database, LibSqlCursorStore, LibSqlSyncConflictRepository, SyncConflictRepository, SyncTable,
};
use cram_core::models::{Quiz, QuizResult, SrsState, UserId};
use cram_core::sync::{
    probe, run_with_retry, Connectivity, EntityKind, FileLocks, LockCoordinator, RemoteStore,
    StaticConnectivity, SupabaseRemote, SyncOrchestrator, SyncReport, SyncResult,
};
use serde::Serialize;

use crate::commands::common::{
    format_sync_conflict_lines, open_database, session_store, stored_user,
    sync_conflict_to_item, SyncConflictItem,
};
use crate::config::{default_lock_dir, CliConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub entity: EntityKind,
    pub cursor_at: Option<String>,
    pub cursor_id: Option<String>,
    pub pending: u64,
}

pub async fn run_sync(
    entity: Option<EntityKind>,
    watch: Option<u64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = CliConfig::load()?;
    let remote_config = config.remote()?.ok_or(CliError::SyncNotConfigured)?;
    let remote = SupabaseRemote::new(&remote_config)?;
    let sessions = session_store();
    let locks = FileLocks::new(default_lock_dir()?);
    let connectivity = StaticConnectivity::offline();
    let db = open_database(db_path).await?;
    let settings = config.sync_settings();

    let orchestrator = SyncOrchestrator::new(&db, &connectivity, &sessions, &locks, &remote)
        .with_settings(settings);

    loop {
        connectivity.set_online(!config.offline && probe(remote_config.url()).await);
        match run_with_retry(settings.retry, || sync_pass(&orchestrator, entity)).await {
            Ok(reports) => {
                for report in &reports {
                    println!("{}", format_report_line(report));
                }
            }
            // A watcher keeps going; the next tick retries
            Err(error) if watch.is_some() => tracing::warn!("Sync failed: {}", error),
            Err(error) => return Err(error.into()),
        }

        let Some(secs) = watch else {
            return Ok(());
        };
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(secs.max(1))) => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
        }
    }
}

async fn sync_pass<N, S, L, R>(
    orchestrator: &SyncOrchestrator<'_, N, S, L, R>,
    entity: Option<EntityKind>,
) -> SyncResult<Vec<SyncReport>>
where
    N: Connectivity,
    S: cram_core::auth::SessionProvider,
    L: LockCoordinator,
    R: RemoteStore,
{
    match entity {
        Some(kind) => Ok(vec![orchestrator.sync_kind(kind).await?]),
        None => orchestrator.sync_all().await,
    }
}

pub fn format_report_line(report: &SyncReport) -> String {
    if let Some(reason) = report.skipped {
        return format!("{:<7}  skipped: {}", report.entity.as_str(), reason.as_str());
    }
    format!(
        "{:<7}  pushed {} ({} stale)  pulled {} ({} adopted, {} kept, {} rejected)",
        report.entity.as_str(),
        report.pushed,
        report.push_stale,
        report.pulled,
        report.adopted,
        report.kept,
        report.rejected
    )
}

pub async fn sync_status(db: &Database, user: &UserId) -> Result<Vec<SyncStatusItem>, CliError> {
    let conn = db.connection();
    let cursors = LibSqlCursorStore::new(conn).list_for_user(user).await?;

    let mut items = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let pending = match kind {
            EntityKind::Srs => SyncTable::<SrsState>::new(conn).dirty_count(user).await?,
            EntityKind::Quizzes => SyncTable::<Quiz>::new(conn).dirty_count(user).await?,
            EntityKind::Results => SyncTable::<QuizResult>::new(conn).dirty_count(user).await?,
        };
        let cursor = cursors
            .iter()
            .find(|(entity, _)| entity == kind.as_str())
            .map(|(_, cursor)| cursor);
        items.push(SyncStatusItem {
            entity: kind,
            cursor_at: cursor.map(|cursor| cursor.last_synced_at.clone()),
            cursor_id: cursor.map(|cursor| cursor.last_id.clone()),
            pending,
        });
    }
    Ok(items)
}

pub async fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let items = sync_status(&db, &user).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in &items {
        let cursor = item
            .cursor_at
            .as_deref()
            .map_or_else(|| "never pulled".to_string(), |at| format!("pulled up to {at}"));
        println!("{:<7}  {} pending  {cursor}", item.entity.as_str(), item.pending);
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let conflicts = LibSqlSyncConflictRepository::new(db.connection())
        .list(&user, limit)
        .await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
