//! Error types for graph compilation and execution.

use thiserror::Error;

/// Convenience result type using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the compiler and the Pregel engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// AWSL source failed to parse.
    #[error(transparent)]
    Parse(#[from] awsl_parser::ParseError),

    /// The workflow is structurally invalid: missing references, zero or
    /// multiple sinks, duplicate names. Reported at compile time.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A node's `call` has no mapping in the function registry.
    #[error("function `{0}` not provided")]
    FunctionNotProvided(String),

    /// A second registration under an already-taken function name.
    #[error("function `{0}` is already registered")]
    DuplicateFunction(String),

    /// A node body failed after exhausting any retry policy.
    #[error("node `{node}` execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// Engine-level failure (recursion limit, missing resume state, ...).
    #[error("execution failed: {0}")]
    Execution(String),

    /// The run's cancellation flag was observed between super-steps.
    #[error("run canceled")]
    Canceled,

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] awsl_checkpoint::CheckpointError),

    /// Channel state (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_workflow(message: impl Into<String>) -> Self {
        Self::InvalidWorkflow(message.into())
    }

    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}
