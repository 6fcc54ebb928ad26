use std::path::Path;

use chrono::Utc;
use cram_core::auth::{SessionPersistence, StoredSession};
use cram_core::db::Database;
use cram_core::models::{QuestionId, SrsState, SrsStats, SyncConflict, UserId};
use serde::Serialize;

use crate::error::CliError;
use crate::session::{CliSessionStore, KeyringSessionStore, DEFAULT_ACCOUNT};

#[derive(Debug, Serialize)]
pub struct DueItem {
    pub question_id: String,
    pub leitner_box: i64,
    pub consecutive_correct: i64,
    pub next_review: i64,
    pub overdue: String,
    pub synced: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity: String,
    pub record_id: String,
    pub local_ts: Option<i64>,
    pub incoming_ts: Option<i64>,
    pub resolution: String,
    pub detail: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub fn session_store() -> CliSessionStore {
    StoredSession::new(KeyringSessionStore::new(DEFAULT_ACCOUNT))
}

/// Owner of local writes: the stored session's user, expired or not.
pub fn stored_user<P: SessionPersistence>(store: &StoredSession<P>) -> Result<UserId, CliError> {
    let session = store.load_session()?.ok_or(CliError::NoSession)?;
    session
        .user_id()
        .ok_or_else(|| CliError::Auth("stored session has no user id".to_string()))
}

pub fn parse_question_id(value: &str) -> Result<QuestionId, CliError> {
    value
        .parse::<QuestionId>()
        .map_err(|_| CliError::InvalidQuestionId(value.trim().to_string()))
}

pub fn due_to_item(state: &SrsState, now_ms: i64) -> DueItem {
    DueItem {
        question_id: state.question_id.to_string(),
        leitner_box: state.leitner_box,
        consecutive_correct: state.consecutive_correct,
        next_review: state.next_review,
        overdue: format_relative_time(state.next_review, now_ms),
        synced: state.synced,
    }
}

pub fn format_due_lines(states: &[SrsState]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    states
        .iter()
        .map(|state| {
            let marker = if state.synced { "" } else { "  *" };
            format!(
                "{}  box {}  due {}{marker}",
                state.question_id,
                state.leitner_box,
                format_relative_time(state.next_review, now_ms)
            )
        })
        .collect()
}

pub fn format_stats_lines(stats: &SrsStats) -> Vec<String> {
    let mut lines = stats
        .per_box
        .iter()
        .enumerate()
        .map(|(index, count)| format!("box {}  {count}", index + 1))
        .collect::<Vec<_>>();
    lines.push(format!("total  {}", stats.total()));
    lines.push(format!("due    {}", stats.due));
    lines.push(format!("dirty  {}", stats.dirty));
    lines
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity: conflict.entity.clone(),
        record_id: conflict.record_id.clone(),
        local_ts: conflict.local_ts,
        incoming_ts: conflict.incoming_ts,
        resolution: conflict.resolution.clone(),
        detail: conflict.detail.clone(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    let render = |ts: Option<i64>| ts.map_or_else(|| "-".to_string(), |ts| ts.to_string());
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<6}  {:<7}  record={}  local={} incoming={}  {}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.resolution,
                conflict.entity,
                conflict.record_id,
                render(conflict.local_ts),
                render(conflict.incoming_ts),
                conflict.detail
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Human distance between `timestamp_ms` and `now_ms`, past or future.
pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    let distance = diff.saturating_abs();
    if distance < minute {
        return "now".to_string();
    }
    let amount = if distance < hour {
        format!("{}m", distance / minute)
    } else if distance < day {
        format!("{}h", distance / hour)
    } else if distance < week {
        format!("{}d", distance / day)
    } else {
        format!("{}w", distance / week)
    };

    if diff > 0 {
        format!("{amount} ago")
    } else {
        format!("in {amount}")
    }
}
