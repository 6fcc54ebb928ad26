//! Error types for cram-core

use thiserror::Error;

/// Result type alias using cram-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cram-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A sync cursor timestamp that does not parse as a date
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A sync cursor id that is neither a UUID nor the nil sentinel
    #[error("Invalid cursor id: {0}")]
    InvalidCursorId(String),
}
