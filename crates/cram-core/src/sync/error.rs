//! Errors that fail a sync cycle

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// A failed sync cycle.
///
/// Offline, signed-out and lock-contended cycles are not errors; they end
/// with an incomplete report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote store could not be reached
    #[error("Sync transport failed: {message}")]
    Transport { message: String, retryable: bool },

    /// HTTP client failure
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store answered with a non-success status
    #[error("Sync API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Remote store answered with something the engine cannot interpret
    #[error("Sync protocol error: {0}")]
    Protocol(String),

    /// Local store failure
    #[error(transparent)]
    Local(#[from] crate::Error),
}

impl SyncError {
    /// Build an API error from a response status and body
    pub fn api(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Api {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Whether re-running the same cycle later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Http(error) => {
                error.is_timeout()
                    || error.is_connect()
                    || error.status().is_some_and(|status| status.is_server_error())
            }
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Protocol(_) | Self::Local(_) => false,
        }
    }
}
