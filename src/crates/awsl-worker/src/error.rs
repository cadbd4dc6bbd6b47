//! Error types for the run queue and worker pool.

use crate::models::RunState;
use thiserror::Error;

/// Convenience result type using [`WorkerError`].
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors raised by run stores and the worker pool.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Engine(#[from] awsl_core::EngineError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] awsl_checkpoint::CheckpointError),

    #[error("run `{0}` not found")]
    RunNotFound(String),

    /// A state change the run lifecycle does not allow (e.g. resuming a
    /// terminal run). Maps to 400 at the API layer.
    #[error("run `{run_id}` cannot go from `{from}` to `{to}`")]
    InvalidTransition {
        run_id: String,
        from: RunState,
        to: RunState,
    },

    #[error("workflow template `{0}` not found")]
    TemplateNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
