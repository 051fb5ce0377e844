//! Common error types for the drive CLI.

use thiserror::Error;

/// Top-level error type for drive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential load, refresh, or authorization flow failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Named remote file or folder is absent. Recoverable; converted to a
    /// user-facing message at the operation boundary.
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote API call failed. Never retried.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
