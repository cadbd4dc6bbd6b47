//! The per-run execution loop.
//!
//! A [`Pregel`] value owns one run's channel state and drives it to a
//! fixpoint: schedule ready nodes, execute their bodies concurrently,
//! apply writes through the reducers, checkpoint, repeat. The loop stops
//! when a super-step schedules nothing, when a node interrupts the run,
//! when the cancellation flag is raised between super-steps, or when the
//! per-run recursion limit is exceeded.
//!
//! Runs with different thread ids never share state: every run
//! instantiates fresh channels from the (shared, immutable) plan.

use crate::error::{EngineError, Result};
use crate::plan::{BodyOutcome, PlanNode, PregelPlan, RunConfig, INTERRUPT_KEY, NOOP_NODE, START_NODE};
use crate::pregel::algo::{apply_writes, prepare_next_tasks, ReadyTask, TaskWrites};
use crate::registry::TaskInput;
use awsl_checkpoint::{
    Channel, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointTuple, WriteOp,
};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a run enters the engine.
#[derive(Debug, Clone)]
pub enum RunInput {
    /// Fresh run with initial parameters for the input channels.
    Start(Map<String, Value>),
    /// Re-entry after a human-in-the-loop interrupt, carrying the
    /// response payload. Requires a configured checkpointer.
    Resume(Value),
}

/// One run's execution state over a compiled plan.
pub struct Pregel {
    plan: Arc<PregelPlan>,
    channels: HashMap<String, Box<dyn Channel>>,
    checkpoint: Checkpoint,
    trigger_to_nodes: HashMap<String, Vec<String>>,
    step: u64,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    cancel: Arc<AtomicBool>,
    pending_push: Vec<String>,
}

impl Pregel {
    pub fn new(plan: Arc<PregelPlan>) -> Self {
        let channels = plan.instantiate_channels();
        let trigger_to_nodes = plan.trigger_to_nodes();
        Self {
            plan,
            channels,
            checkpoint: Checkpoint::empty(),
            trigger_to_nodes,
            step: 0,
            checkpointer: None,
            cancel: Arc::new(AtomicBool::new(false)),
            pending_push: Vec::new(),
        }
    }

    /// Persist a checkpoint after every super-step under the run's
    /// thread id.
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    /// Handle for cooperative cancellation. Raising the flag aborts the
    /// loop at the next super-step boundary, never mid-body.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Execute to completion, interrupt or failure, returning the
    /// projected outputs (plus `__interrupt__` when suspended).
    pub async fn invoke(
        &mut self,
        input: RunInput,
        config: &RunConfig,
    ) -> Result<Map<String, Value>> {
        // Workflow metadata sits under run metadata; run entries win.
        let mut metadata = self.plan.metadata.clone();
        metadata.extend(config.metadata.clone());
        let config = RunConfig {
            thread_id: config.thread_id.clone(),
            recursion_limit: config.recursion_limit,
            metadata,
        };

        match input {
            RunInput::Start(params) => self.apply_input(params, &config).await?,
            RunInput::Resume(value) => self.apply_resume(value, &config).await?,
        }
        self.run_loop(&config).await
    }

    /// Current values of the declared output channels.
    pub fn project_outputs(&self) -> Map<String, Value> {
        let mut outputs = Map::new();
        for key in &self.plan.output_channels {
            if let Some(value) = self.channels.get(key).and_then(|c| c.get()) {
                outputs.insert(key.clone(), value);
            }
        }
        outputs
    }

    /// Write the run's initial parameters as the synthetic start task.
    async fn apply_input(&mut self, params: Map<String, Value>, config: &RunConfig) -> Result<()> {
        let mut writes: Vec<(String, WriteOp)> = Vec::new();
        for (key, value) in params {
            if self.plan.input_channels.contains(&key) {
                writes.push((key, WriteOp::Put(value)));
            } else {
                tracing::warn!(param = %key, "ignoring parameter with no input channel");
            }
        }
        let task = TaskWrites {
            name: START_NODE.to_string(),
            writes,
            triggers: Vec::new(),
        };
        apply_writes(&mut self.checkpoint, &mut self.channels, vec![task])?;
        self.save_checkpoint(config, CheckpointSource::Input).await
    }

    /// Restore saved state and hand the resume payload to the
    /// interrupted node's output channels.
    async fn apply_resume(&mut self, value: Value, config: &RunConfig) -> Result<()> {
        let saver = self.checkpointer.clone().ok_or_else(|| {
            EngineError::execution("resume requires a configured checkpointer")
        })?;
        let tuple = saver
            .get_tuple(&CheckpointConfig::new(&config.thread_id))
            .await?
            .ok_or_else(|| {
                EngineError::execution(format!(
                    "no checkpoint found for thread `{}`",
                    config.thread_id
                ))
            })?;
        self.restore(tuple)?;

        let node_name = self.checkpoint.interrupted_node.take().ok_or_else(|| {
            EngineError::execution("run has no pending interrupt to resume")
        })?;
        let node = self.plan.nodes.get(&node_name).cloned().ok_or_else(|| {
            EngineError::execution(format!("interrupted node `{node_name}` is not in the plan"))
        })?;

        // An object whose keys all name output ports maps port-wise;
        // anything else lands on every declared output of the node.
        let mut writes: Vec<(String, WriteOp)> = Vec::new();
        match &value {
            Value::Object(map)
                if !map.is_empty()
                    && map
                        .keys()
                        .all(|k| node.writes.contains(&format!("{node_name}.{k}"))) =>
            {
                for (port, v) in map {
                    writes.push((format!("{node_name}.{port}"), WriteOp::Put(v.clone())));
                }
            }
            other => {
                for channel in &node.writes {
                    writes.push((channel.clone(), WriteOp::Put(other.clone())));
                }
            }
        }

        tracing::info!(node = %node_name, thread_id = %config.thread_id, "resuming interrupted run");
        let task = TaskWrites {
            name: node_name.clone(),
            writes,
            triggers: node.triggers.clone(),
        };
        apply_writes(&mut self.checkpoint, &mut self.channels, vec![task])?;
        self.checkpoint.nodes_run.insert(node_name);
        self.save_checkpoint(config, CheckpointSource::Resume).await
    }

    fn restore(&mut self, tuple: CheckpointTuple) -> Result<()> {
        for (key, snapshot) in &tuple.checkpoint.channel_values {
            if let Some(channel) = self.channels.get_mut(key) {
                channel.restore(snapshot.clone())?;
            }
        }
        self.step = tuple.metadata.step.unwrap_or(0);
        self.checkpoint = tuple.checkpoint;
        Ok(())
    }

    async fn save_checkpoint(
        &mut self,
        config: &RunConfig,
        source: CheckpointSource,
    ) -> Result<()> {
        let Some(saver) = &self.checkpointer else {
            return Ok(());
        };
        self.checkpoint.channel_values = self
            .channels
            .iter()
            .map(|(key, channel)| (key.clone(), channel.checkpoint()))
            .collect();
        saver
            .put(
                &CheckpointConfig::new(&config.thread_id),
                self.checkpoint.clone(),
                CheckpointMetadata::new(source, self.step),
            )
            .await?;
        Ok(())
    }

    async fn run_loop(&mut self, config: &RunConfig) -> Result<Map<String, Value>> {
        loop {
            if self.step >= config.recursion_limit {
                return Err(EngineError::execution(format!(
                    "recursion limit ({}) exceeded",
                    config.recursion_limit
                )));
            }
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!(thread_id = %config.thread_id, "cancellation observed between super-steps");
                return Err(EngineError::Canceled);
            }

            let pushed = std::mem::take(&mut self.pending_push);
            let updated: Option<HashSet<String>> = self
                .checkpoint
                .updated_channels
                .as_ref()
                .map(|channels| channels.iter().cloned().collect());
            let tasks = prepare_next_tasks(
                &self.checkpoint,
                &self.plan.nodes,
                &self.channels,
                updated.as_ref(),
                &self.trigger_to_nodes,
                &pushed,
            );
            if tasks.is_empty() {
                break;
            }
            tracing::debug!(
                step = self.step,
                tasks = ?tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "super-step scheduled"
            );

            // Run-once nodes that already committed take the NOOP path
            // without their body being invoked again.
            let mut settled: Vec<(ReadyTask, BodyOutcome)> = Vec::new();
            let mut runnable: Vec<(ReadyTask, PlanNode)> = Vec::new();
            for task in tasks {
                let Some(node) = self.plan.nodes.get(&task.name).cloned() else {
                    continue;
                };
                if node.run_once && self.checkpoint.nodes_run.contains(&task.name) {
                    settled.push((task, BodyOutcome::Redirect(NOOP_NODE.to_string())));
                } else {
                    runnable.push((task, node));
                }
            }

            let futures = runnable.into_iter().map(|(task, node)| async move {
                let outcome = run_with_retry(&node, task.input.clone(), config).await;
                (task, outcome)
            });
            let results = join_all(futures).await;

            let mut task_writes: Vec<TaskWrites> = Vec::new();
            let mut interrupt: Option<(String, Value)> = None;
            let outcomes = settled
                .into_iter()
                .map(|(task, outcome)| (task, Ok(outcome)))
                .chain(results);
            for (task, outcome) in outcomes {
                match outcome? {
                    BodyOutcome::Writes(writes) => {
                        if !writes.is_empty() {
                            self.checkpoint.nodes_run.insert(task.name.clone());
                        }
                        task_writes.push(TaskWrites {
                            name: task.name,
                            writes,
                            triggers: task.triggers,
                        });
                    }
                    BodyOutcome::Empty => {
                        task_writes.push(TaskWrites::marker(task.name, task.triggers));
                    }
                    BodyOutcome::Redirect(target) => {
                        self.pending_push.push(target);
                        task_writes.push(TaskWrites::marker(task.name, task.triggers));
                    }
                    BodyOutcome::Interrupt(payload) => {
                        self.checkpoint.nodes_run.insert(task.name.clone());
                        interrupt = Some((task.name.clone(), payload));
                        task_writes.push(TaskWrites::marker(task.name, task.triggers));
                    }
                }
            }

            apply_writes(&mut self.checkpoint, &mut self.channels, task_writes)?;

            if let Some((node, payload)) = interrupt {
                self.checkpoint.interrupted_node = Some(node.clone());
                self.save_checkpoint(config, CheckpointSource::Loop).await?;
                tracing::info!(node = %node, thread_id = %config.thread_id, "run interrupted for human input");
                let mut result = self.project_outputs();
                result.insert(INTERRUPT_KEY.to_string(), payload);
                return Ok(result);
            }

            self.save_checkpoint(config, CheckpointSource::Loop).await?;
            self.step += 1;
        }

        tracing::debug!(thread_id = %config.thread_id, steps = self.step, "run reached fixpoint");
        Ok(self.project_outputs())
    }
}

/// Invoke a body, honouring the node's retry policy. The engine never
/// swallows the final error: it fails the run with the node's name and
/// the original message.
async fn run_with_retry(
    node: &PlanNode,
    input: TaskInput,
    config: &RunConfig,
) -> Result<BodyOutcome> {
    let mut failed_attempts = 0u32;
    loop {
        match node.body.run(input.clone(), config).await {
            Ok(outcome) => return Ok(outcome),
            Err(error) => {
                failed_attempts += 1;
                if let Some(policy) = &node.retry {
                    if failed_attempts < policy.max_attempts {
                        let delay = policy.delay_for(failed_attempts);
                        tracing::warn!(
                            node = %node.name,
                            attempt = failed_attempts,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "node body failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                tracing::error!(node = %node.name, %error, "node execution failed");
                return Err(EngineError::node_execution(&node.name, error.to_string()));
            }
        }
    }
}
