//! The run store abstraction.
//!
//! All mutations of `workflow_runs` go through this trait. The Postgres
//! implementation carries the production claim protocol (`FOR UPDATE
//! SKIP LOCKED`); the in-memory implementation backs tests with the same
//! at-most-one-claim guarantee under a mutex.

use crate::error::Result;
use crate::models::{RunState, WorkflowRun};
use async_trait::async_trait;
use serde_json::Value;

/// Persistence for workflow runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new `queued` run for a template.
    async fn create_run(&self, graph_name: &str, query: &str) -> Result<WorkflowRun>;

    /// Claim the oldest `queued` run for `worker_id`, transitioning it to
    /// `running` and bumping its attempt counter. At most one worker can
    /// claim a given run; returns `None` when the queue is empty.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<WorkflowRun>>;

    /// Refresh `heartbeat_at` for a `running` run.
    async fn heartbeat(&self, run_id: &str) -> Result<()>;

    async fn get(&self, run_id: &str) -> Result<Option<WorkflowRun>>;

    /// All runs, newest first.
    async fn list(&self) -> Result<Vec<WorkflowRun>>;

    /// Record a run's outcome: `succeeded`, `failed`, `needs_input` or
    /// `canceled`, with the result and/or error to persist. A null
    /// result keeps whatever was stored before.
    async fn complete(
        &self,
        run_id: &str,
        state: RunState,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()>;

    /// Attach a resume payload and flip a `needs_input` run back to
    /// `queued`. Any other state is an invalid transition.
    async fn resume(&self, run_id: &str, payload: Value) -> Result<WorkflowRun>;

    /// Cancel a `queued` or `running` run. Any other state is an invalid
    /// transition. Workers observe the change at their next heartbeat.
    async fn cancel(&self, run_id: &str) -> Result<WorkflowRun>;
}
