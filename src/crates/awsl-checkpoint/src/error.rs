//! Error types for channels and checkpoint storage.

use thiserror::Error;

/// Convenience result type using [`CheckpointError`].
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors raised by channel updates and checkpoint backends.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// An update or snapshot that violates the channel's contract.
    #[error("invalid channel operation: {0}")]
    Invalid(String),

    /// No checkpoint stored for the requested thread.
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// Snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}
