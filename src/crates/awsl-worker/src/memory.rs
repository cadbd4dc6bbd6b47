//! In-memory run store.
//!
//! Backs the test suites with the same semantics as the Postgres store:
//! claims are atomic under one mutex, so a run can never be handed to
//! two workers, and ids order the queue the way `ORDER BY id` does.

use crate::error::{Result, WorkerError};
use crate::models::{RunState, WorkflowRun};
use crate::store::RunStore;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Thread-safe in-memory `workflow_runs` table.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<BTreeMap<String, WorkflowRun>>,
    sequence: AtomicU64,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        // Monotonic prefix keeps BTreeMap iteration in claim order.
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{seq:08}-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, graph_name: &str, query: &str) -> Result<WorkflowRun> {
        let id = self.next_id();
        let run = WorkflowRun {
            id: id.clone(),
            graph_name: graph_name.to_string(),
            thread_id: id.clone(),
            state: RunState::Queued.as_str().to_string(),
            query: Some(query.to_string()),
            result: None,
            error: None,
            worker_id: None,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            heartbeat_at: None,
            finished_at: None,
            resume_payload: None,
        };
        self.runs
            .lock()
            .expect("run store lock poisoned")
            .insert(id, run.clone());
        Ok(run)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<WorkflowRun>> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let next_id = runs
            .values()
            .find(|run| run.run_state() == RunState::Queued)
            .map(|run| run.id.clone());
        let Some(id) = next_id else {
            return Ok(None);
        };
        let run = runs.get_mut(&id).expect("id just looked up");
        run.state = RunState::Running.as_str().to_string();
        run.worker_id = Some(worker_id.to_string());
        run.started_at = Some(Utc::now());
        run.heartbeat_at = Some(Utc::now());
        run.attempt += 1;
        Ok(Some(run.clone()))
    }

    async fn heartbeat(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        if let Some(run) = runs.get_mut(run_id) {
            if run.run_state() == RunState::Running {
                run.heartbeat_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        Ok(self
            .runs
            .lock()
            .expect("run store lock poisoned")
            .get(run_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowRun>> {
        let runs = self.runs.lock().expect("run store lock poisoned");
        let mut all: Vec<WorkflowRun> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn complete(
        &self,
        run_id: &str,
        state: RunState,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| WorkerError::RunNotFound(run_id.to_string()))?;
        run.state = state.as_str().to_string();
        if let Some(result) = result {
            run.result = Some(result);
        }
        run.error = error;
        run.resume_payload = None;
        if state.is_terminal() {
            run.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn resume(&self, run_id: &str, payload: Value) -> Result<WorkflowRun> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| WorkerError::RunNotFound(run_id.to_string()))?;
        if run.run_state() != RunState::NeedsInput {
            return Err(WorkerError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.run_state(),
                to: RunState::Queued,
            });
        }
        run.state = RunState::Queued.as_str().to_string();
        run.resume_payload = Some(payload);
        run.error = None;
        Ok(run.clone())
    }

    async fn cancel(&self, run_id: &str) -> Result<WorkflowRun> {
        let mut runs = self.runs.lock().expect("run store lock poisoned");
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| WorkerError::RunNotFound(run_id.to_string()))?;
        if !matches!(run.run_state(), RunState::Queued | RunState::Running) {
            return Err(WorkerError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.run_state(),
                to: RunState::Canceled,
            });
        }
        run.state = RunState::Canceled.as_str().to_string();
        run.finished_at = Some(Utc::now());
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_claim() {
        let store = MemoryRunStore::new();
        let run = store.create_run("research", "hello").await.unwrap();
        assert_eq!(run.run_state(), RunState::Queued);
        assert_eq!(run.thread_id, run.id);

        let claimed = store.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, run.id);
        assert_eq!(claimed.run_state(), RunState::Running);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));
        assert_eq!(claimed.attempt, 1);

        // Nothing left to claim.
        assert!(store.claim_next("w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_contention_hands_out_distinct_runs() {
        let store = Arc::new(MemoryRunStore::new());
        for i in 0..3 {
            store
                .create_run("research", &format!("query {i}"))
                .await
                .unwrap();
        }

        // Two workers issue four concurrent polls against three rows.
        let claims = futures::future::join_all((0..4).map(|i| {
            let store = store.clone();
            async move {
                let worker = if i % 2 == 0 { "w1" } else { "w2" };
                store.claim_next(worker).await.unwrap()
            }
        }))
        .await;

        let claimed: Vec<&WorkflowRun> = claims.iter().flatten().collect();
        assert_eq!(claimed.len(), 3, "exactly the three rows were claimed");
        assert_eq!(claims.iter().filter(|c| c.is_none()).count(), 1);

        let ids: HashSet<&str> = claimed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 3, "no row was claimed twice");
    }

    #[tokio::test]
    async fn test_claim_order_is_oldest_first() {
        let store = MemoryRunStore::new();
        let first = store.create_run("a", "1").await.unwrap();
        let second = store.create_run("b", "2").await.unwrap();

        assert_eq!(store.claim_next("w").await.unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next("w").await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_resume_requires_needs_input() {
        let store = MemoryRunStore::new();
        let run = store.create_run("research", "q").await.unwrap();

        let err = store.resume(&run.id, json!("answer")).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTransition { .. }));

        store.claim_next("w").await.unwrap();
        store
            .complete(&run.id, RunState::NeedsInput, Some(json!({"x": 1})), None)
            .await
            .unwrap();

        let resumed = store.resume(&run.id, json!("answer")).await.unwrap();
        assert_eq!(resumed.run_state(), RunState::Queued);
        assert_eq!(resumed.resume_payload, Some(json!("answer")));

        // Resume idempotence: a second resume is rejected.
        let err = store.resume(&run.id, json!("again")).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_transitions() {
        let store = MemoryRunStore::new();
        let run = store.create_run("research", "q").await.unwrap();
        let canceled = store.cancel(&run.id).await.unwrap();
        assert_eq!(canceled.run_state(), RunState::Canceled);
        assert!(canceled.finished_at.is_some());

        // Terminal: cannot cancel again.
        let err = store.cancel(&run.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_complete_keeps_previous_result_when_none() {
        let store = MemoryRunStore::new();
        let run = store.create_run("research", "q").await.unwrap();
        store.claim_next("w").await.unwrap();
        store
            .complete(&run.id, RunState::NeedsInput, Some(json!({"partial": 1})), None)
            .await
            .unwrap();
        store
            .complete(&run.id, RunState::Canceled, None, None)
            .await
            .unwrap();

        let stored = store.get(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.result, Some(json!({"partial": 1})));
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_only_running() {
        let store = MemoryRunStore::new();
        let run = store.create_run("research", "q").await.unwrap();
        store.heartbeat(&run.id).await.unwrap();
        assert!(store.get(&run.id).await.unwrap().unwrap().heartbeat_at.is_none());

        store.claim_next("w").await.unwrap();
        let before = store
            .get(&run.id)
            .await
            .unwrap()
            .unwrap()
            .heartbeat_at
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.heartbeat(&run.id).await.unwrap();
        let after = store
            .get(&run.id)
            .await
            .unwrap()
            .unwrap()
            .heartbeat_at
            .unwrap();
        assert!(after >= before);
    }
}
