use std::path::Path;

use chrono::Utc;
use cram_core::db::{LibSqlSrsRepository, SrsRepository};
use cram_core::models::SrsState;

use crate::commands::common::{
    due_to_item, format_due_lines, format_relative_time, format_stats_lines, open_database,
    parse_question_id, session_store, stored_user, DueItem,
};
use crate::error::CliError;

pub async fn run_review(question_id: &str, correct: bool, db_path: &Path) -> Result<(), CliError> {
    let question_id = parse_question_id(question_id)?;
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let now_ms = Utc::now().timestamp_millis();

    let state = LibSqlSrsRepository::new(db.connection())
        .record_review(&question_id, &user, correct, now_ms)
        .await?;
    println!("{}", review_summary(&state, now_ms));
    Ok(())
}

pub fn review_summary(state: &SrsState, now_ms: i64) -> String {
    format!(
        "{}  box {}  streak {}  next review {}",
        state.question_id,
        state.leitner_box,
        state.consecutive_correct,
        format_relative_time(state.next_review, now_ms)
    )
}

pub async fn run_due(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let now_ms = Utc::now().timestamp_millis();
    let due = LibSqlSrsRepository::new(db.connection())
        .list_due(&user, now_ms, limit)
        .await?;

    if as_json {
        let json_items = due
            .iter()
            .map(|state| due_to_item(state, now_ms))
            .collect::<Vec<DueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if due.is_empty() {
        println!("Nothing due.");
        return Ok(());
    }
    for line in format_due_lines(&due) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_stats(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let user = stored_user(&session_store())?;
    let db = open_database(db_path).await?;
    let stats = LibSqlSrsRepository::new(db.connection())
        .stats(&user, Utc::now().timestamp_millis())
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}
