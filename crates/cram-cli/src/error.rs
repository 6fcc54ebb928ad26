use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cram_core::Error),
    #[error(transparent)]
    Sync(#[from] cram_core::sync::SyncError),
    #[error(transparent)]
    LibSql(#[from] libsql::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid question ID: {0}")]
    InvalidQuestionId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("No stored session. Run `cram auth set` first.")]
    NoSession,
    #[error("Refusing to wipe local data without --yes")]
    WipeNotConfirmed,
    #[error(
        "Sync is not configured. Run `cram config init` or set CRAM_SUPABASE_URL and CRAM_SUPABASE_ANON_KEY."
    )]
    SyncNotConfigured,
}

impl From<cram_core::auth::AuthError> for CliError {
    fn from(error: cram_core::auth::AuthError) -> Self {
        Self::Auth(error.to_string())
    }
}
