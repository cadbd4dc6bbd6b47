//! The worker pool: claims queued runs and drives them through the engine.
//!
//! Each worker loops: claim the oldest `queued` run, resolve its template,
//! compile, execute with a checkpointer attached, and write the outcome
//! back (`succeeded`, `needs_input`, `failed` or `canceled`). While a run
//! executes, a sidecar task heartbeats and watches for external
//! cancellation, which the engine honours at the next super-step
//! boundary.

use crate::error::{Result, WorkerError};
use crate::models::{RunState, WorkflowRun};
use crate::store::RunStore;
use crate::templates::get_template;
use awsl_checkpoint::CheckpointSaver;
use awsl_core::{
    compile_source, EngineError, FunctionRegistry, Pregel, RunConfig, RunInput,
    DEFAULT_RECURSION_LIMIT, INTERRUPT_KEY,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pool configuration; defaults mirror the environment knobs
/// (`WORKERS=4`, 10 s polling and heartbeating).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub workflows_dir: PathBuf,
    pub recursion_limit: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            workflows_dir: PathBuf::from("workflows"),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

/// A pool of workers over one run store.
#[derive(Clone)]
pub struct WorkerPool {
    store: Arc<dyn RunStore>,
    checkpointer: Arc<dyn CheckpointSaver>,
    registry: Arc<FunctionRegistry>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn RunStore>,
        checkpointer: Arc<dyn CheckpointSaver>,
        registry: Arc<FunctionRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            checkpointer,
            registry,
            config,
        }
    }

    /// Spawn the configured number of workers and run until aborted.
    pub async fn run(&self) {
        let mut handles = Vec::new();
        for _ in 0..self.config.concurrency.max(1) {
            let pool = self.clone();
            let worker_id = format!("w{}", Uuid::new_v4());
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_id).await;
            }));
        }
        for handle in handles {
            if let Err(error) = handle.await {
                tracing::error!(%error, "worker task ended unexpectedly");
            }
        }
    }

    async fn worker_loop(&self, worker_id: String) {
        tracing::info!(worker_id = %worker_id, "worker started");
        loop {
            match self.run_one(&worker_id).await {
                Ok(Some(run_id)) => {
                    tracing::debug!(worker_id = %worker_id, run_id = %run_id, "run finished");
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(error) => {
                    tracing::error!(worker_id = %worker_id, %error, "worker iteration failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Claim and execute at most one run. Returns the run id when one was
    /// claimed. Execution errors are persisted on the run, never bubbled.
    pub async fn run_one(&self, worker_id: &str) -> Result<Option<String>> {
        let Some(run) = self.store.claim_next(worker_id).await? else {
            return Ok(None);
        };
        let run_id = run.id.clone();
        tracing::info!(
            worker_id = %worker_id,
            run_id = %run_id,
            graph = %run.graph_name,
            attempt = run.attempt,
            resuming = run.resume_payload.is_some(),
            "claimed run"
        );
        if let Err(error) = self.execute(run).await {
            tracing::error!(run_id = %run_id, %error, "run failed");
            if let Err(persist) = self
                .store
                .complete(&run_id, RunState::Failed, None, Some(error.to_string()))
                .await
            {
                tracing::error!(run_id = %run_id, error = %persist, "failed to record run failure");
            }
        }
        Ok(Some(run_id))
    }

    async fn execute(&self, run: WorkflowRun) -> Result<()> {
        let template = get_template(&self.config.workflows_dir, &run.graph_name)?
            .ok_or_else(|| WorkerError::TemplateNotFound(run.graph_name.clone()))?;
        let source = tokio::fs::read_to_string(&template.path).await?;
        let plan = Arc::new(compile_source(&source, &self.registry)?);

        let mut engine = Pregel::new(plan).with_checkpointer(self.checkpointer.clone());
        let cancel = engine.cancel_flag();

        // Heartbeat sidecar; also observes external cancellation.
        let heartbeat_store = self.store.clone();
        let heartbeat_id = run.id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::time::sleep(heartbeat_interval).await;
                if let Err(error) = heartbeat_store.heartbeat(&heartbeat_id).await {
                    tracing::warn!(run_id = %heartbeat_id, %error, "heartbeat failed");
                }
                if let Ok(Some(current)) = heartbeat_store.get(&heartbeat_id).await {
                    if current.run_state() == RunState::Canceled {
                        cancel.store(true, Ordering::SeqCst);
                    }
                }
            }
        });

        let input = match run.resume_payload.clone() {
            Some(payload) => RunInput::Resume(payload),
            None => {
                let mut params = Map::new();
                params.insert(
                    "query".to_string(),
                    Value::String(run.query.clone().unwrap_or_default()),
                );
                RunInput::Start(params)
            }
        };
        let mut config = RunConfig::new(&run.thread_id);
        config.recursion_limit = self.config.recursion_limit;

        let outcome = engine.invoke(input, &config).await;
        heartbeat.abort();

        match outcome {
            Ok(result) => {
                let state = if result.contains_key(INTERRUPT_KEY) {
                    RunState::NeedsInput
                } else {
                    RunState::Succeeded
                };
                self.store
                    .complete(&run.id, state, Some(Value::Object(result)), None)
                    .await?;
            }
            Err(EngineError::Canceled) => {
                // Canceled runs keep whatever was produced so far.
                let partial = engine.project_outputs();
                self.store
                    .complete(&run.id, RunState::Canceled, Some(Value::Object(partial)), None)
                    .await?;
            }
            Err(error) => {
                self.store
                    .complete(&run.id, RunState::Failed, None, Some(error.to_string()))
                    .await?;
            }
        }
        Ok(())
    }
}
