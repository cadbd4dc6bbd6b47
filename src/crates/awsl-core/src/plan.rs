//! The Pregel plan: what the compiler produces and the engine runs.
//!
//! A plan is a keyed channel-and-node graph. Channels are addressed by
//! string key; nodes hold keys, never pointers. Channel state itself lives
//! in a single per-run map owned by the engine, so one plan value can
//! serve any number of concurrent runs.
//!
//! Channel keys:
//! - workflow inputs and outputs by bare port name,
//! - `Node.port` for node outputs,
//! - `Cycle.port` for a cycle's scope,
//! - `Cycle.iteration_counter` for its `SUM` counter.

use crate::error::Result;
use crate::registry::TaskInput;
use crate::retry::RetryPolicy;
use awsl_checkpoint::{AppendChannel, Channel, LastValueChannel, SumChannel, WriteOp};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Synthetic source of the run's initial parameters.
pub const START_NODE: &str = "START_NODE";

/// The do-nothing node readiness gating redirects to.
pub const NOOP_NODE: &str = "NOOP_NODE";

/// Result key carrying a pending interrupt's payload.
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// Default per-run super-step limit.
pub const DEFAULT_RECURSION_LIMIT: u64 = 100;

/// Which reducer a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerKind {
    Last,
    Sum,
    Append,
}

impl ReducerKind {
    /// Fresh channel state for this reducer.
    pub fn instantiate(&self) -> Box<dyn Channel> {
        match self {
            ReducerKind::Last => Box::new(LastValueChannel::new()),
            ReducerKind::Sum => Box::new(SumChannel::new()),
            ReducerKind::Append => Box::new(AppendChannel::new()),
        }
    }
}

/// Per-run execution configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scopes checkpoints and config delivery; equals the run id under
    /// the worker.
    pub thread_id: String,
    /// Super-step limit bounding the whole run.
    pub recursion_limit: u64,
    /// Run-level metadata merged under every node's config.
    pub metadata: Map<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: "default".to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            metadata: Map::new(),
        }
    }
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }
}

/// What a plan node's body produced.
///
/// The engine matches exhaustively: writes are applied through reducers,
/// a redirect schedules the named node next super-step without touching
/// channels, an interrupt suspends the run.
#[derive(Debug, Clone)]
pub enum BodyOutcome {
    /// Channel-key-qualified writes.
    Writes(Vec<(String, WriteOp)>),
    /// No writes and the underlying function did not run.
    Empty,
    /// Trigger the named node instead, without updating any channels.
    Redirect(String),
    /// Suspend the run with this payload.
    Interrupt(Value),
}

/// Future returned by a plan node body.
pub type BodyFuture = Pin<Box<dyn Future<Output = Result<BodyOutcome>> + Send>>;

/// A compiled node body. Wraps readiness gating, `when` guards and the
/// user function (or cycle scaffolding) behind one callable.
pub trait NodeBody: Send + Sync {
    fn run(&self, input: TaskInput, config: &RunConfig) -> BodyFuture;
}

/// A node of the compiled plan.
#[derive(Clone)]
pub struct PlanNode {
    pub name: String,
    /// Writes to any of these channels in super-step *t* queue this node
    /// for execution in super-step *t+1*.
    pub triggers: Vec<String>,
    /// Channels projected into the task input.
    pub reads: Vec<String>,
    /// Channels this node is expected to write (used for resume handoff).
    pub writes: Vec<String>,
    /// Non-cycle nodes execute at most once per run.
    pub run_once: bool,
    pub retry: Option<RetryPolicy>,
    pub body: Arc<dyn NodeBody>,
}

impl std::fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanNode")
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("run_once", &self.run_once)
            .field("retry", &self.retry)
            .finish()
    }
}

/// A compiled workflow, ready to execute.
pub struct PregelPlan {
    /// Workflow name from the source.
    pub name: String,
    /// Channel key → reducer.
    pub channels: HashMap<String, ReducerKind>,
    pub nodes: HashMap<String, PlanNode>,
    /// Channels accepting the run's initial parameters.
    pub input_channels: Vec<String>,
    /// Channels projected into the final result.
    pub output_channels: Vec<String>,
    /// Workflow metadata, delivered under every node config.
    pub metadata: Map<String, Value>,
    /// Node-level dependency edges (dep → dependents is derivable); kept
    /// for sink validation output and graph rendering.
    pub dependencies: HashMap<String, Vec<String>>,
    /// The unique sink whose outputs feed the result.
    pub sink: String,
}

impl PregelPlan {
    /// Fresh channel state for a new run.
    pub fn instantiate_channels(&self) -> HashMap<String, Box<dyn Channel>> {
        self.channels
            .iter()
            .map(|(key, kind)| (key.clone(), kind.instantiate()))
            .collect()
    }

    /// Channel → nodes it triggers.
    pub fn trigger_to_nodes(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, node) in &self.nodes {
            for trigger in &node.triggers {
                map.entry(trigger.clone()).or_default().push(name.clone());
            }
        }
        for nodes in map.values_mut() {
            nodes.sort_unstable();
        }
        map
    }
}

impl std::fmt::Debug for PregelPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PregelPlan")
            .field("name", &self.name)
            .field("channels", &self.channels.len())
            .field("nodes", &self.nodes.len())
            .field("input_channels", &self.input_channels)
            .field("output_channels", &self.output_channels)
            .field("sink", &self.sink)
            .finish()
    }
}
