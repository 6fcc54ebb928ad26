//! Cram CLI - review questions and sync study progress from the terminal.

mod cli;
mod commands;
mod config;
mod error;
mod session;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::review::{run_due, run_review, run_stats};
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_status};
use crate::commands::wipe::run_wipe;
use crate::config::CliConfig;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "cram=info,cram_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = CliConfig::load()?.resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Review {
            question_id,
            correct,
            incorrect: _,
        } => run_review(&question_id, correct, &db_path).await?,
        Commands::Due { limit, json } => run_due(limit, json, &db_path).await?,
        Commands::Stats { json } => run_stats(json, &db_path).await?,
        Commands::Sync {
            command,
            entity,
            watch,
        } => match command {
            Some(SyncCommands::Status { json }) => run_sync_status(json, &db_path).await?,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            None => run_sync(entity.map(Into::into), watch, &db_path).await?,
        },
        Commands::Auth { command } => run_auth(command)?,
        Commands::Config { command } => run_config(command)?,
        Commands::Wipe { yes } => run_wipe(yes, &db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
