//! Run records and the run-state machine.
//!
//! A workflow run is created `queued`, claimed exactly once into
//! `running`, and moves to `needs_input`, `succeeded`, `failed` or
//! `canceled`. Resuming flips a `needs_input` run back to `queued` with a
//! resume payload attached; `succeeded`, `failed` and `canceled` are
//! terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    NeedsInput,
    Failed,
    Succeeded,
    Canceled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::NeedsInput => "needs_input",
            RunState::Failed => "failed",
            RunState::Succeeded => "succeeded",
            RunState::Canceled => "canceled",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "queued" => Some(RunState::Queued),
            "running" => Some(RunState::Running),
            "needs_input" => Some(RunState::NeedsInput),
            "failed" => Some(RunState::Failed),
            "succeeded" => Some(RunState::Succeeded),
            "canceled" => Some(RunState::Canceled),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Canceled
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `workflow_runs`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowRun {
    pub id: String,
    /// Template identifier resolved through the workflows directory.
    pub graph_name: String,
    /// Checkpoint scope; equals `id`.
    pub thread_id: String,
    pub state: String,
    /// Initial input handed to the run as the `query` parameter.
    pub query: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub worker_id: Option<String>,
    /// Bumped on every claim.
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub resume_payload: Option<serde_json::Value>,
}

impl WorkflowRun {
    /// Typed view of the `state` column. Unknown text maps to `Failed`
    /// so a corrupted row can never look claimable.
    pub fn run_state(&self) -> RunState {
        RunState::parse(&self.state).unwrap_or(RunState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            RunState::Queued,
            RunState::Running,
            RunState::NeedsInput,
            RunState::Failed,
            RunState::Succeeded,
            RunState::Canceled,
        ] {
            assert_eq!(RunState::parse(state.as_str()), Some(state));
        }
        assert_eq!(RunState::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Canceled.is_terminal());
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::NeedsInput.is_terminal());
    }
}
