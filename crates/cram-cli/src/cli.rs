use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use cram_core::sync::EntityKind;

#[derive(Parser)]
#[command(name = "cram")]
#[command(about = "Review questions and sync study progress from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record the outcome of one question review
    #[command(group(ArgGroup::new("outcome").required(true).args(["correct", "incorrect"])))]
    Review {
        /// Question ID (UUID)
        question_id: String,
        /// The answer was correct
        #[arg(long)]
        correct: bool,
        /// The answer was wrong
        #[arg(long)]
        incorrect: bool,
    },
    /// List questions due for review
    Due {
        /// Number of questions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show Leitner box distribution and backlog
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes and pull remote ones
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Only sync one entity
        #[arg(long, value_enum)]
        entity: Option<EntityArg>,
        /// Keep syncing every N seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Manage the stored session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Configure the remote store
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Delete all local data of the signed-in user
    Wipe {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum EntityArg {
    Srs,
    Quizzes,
    Results,
}

impl From<EntityArg> for EntityKind {
    fn from(value: EntityArg) -> Self {
        match value {
            EntityArg::Srs => Self::Srs,
            EntityArg::Quizzes => Self::Quizzes,
            EntityArg::Results => Self::Results,
        }
    }
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show cursors and pending local changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently logged sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a session issued by the auth provider
    Set {
        /// Access token
        #[arg(long, value_name = "TOKEN")]
        access_token: String,
        /// Refresh token
        #[arg(long, value_name = "TOKEN")]
        refresh_token: Option<String>,
        /// Authenticated user ID
        #[arg(long, value_name = "ID")]
        user_id: String,
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
        /// Seconds until the access token expires
        #[arg(long, value_name = "SECS", default_value = "3600")]
        expires_in: i64,
    },
    /// Show the stored session
    Status,
    /// Remove the stored session
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the remote store settings
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Rows requested per pull page
        #[arg(long, value_name = "N")]
        pull_page_size: Option<usize>,
        /// Pages pulled per cycle
        #[arg(long, value_name = "N")]
        max_pull_pages: Option<usize>,
    },
    /// Print the effective configuration
    Show,
}
