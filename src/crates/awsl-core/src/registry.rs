//! The function registry: symbolic `call` names to node functions.
//!
//! Node functions are the only user-supplied code the engine runs. A
//! function receives the task input (current values of the node's read
//! channels, keyed by channel key) and a per-invocation config whose
//! `metadata` merges workflow metadata, run metadata and the node's
//! declared constants. It returns a [`NodeResult`]:
//!
//! - `Update` — port-name-keyed writes; the engine qualifies them with
//!   the node name before committing.
//! - `Empty` — no writes; the node is re-invoked once more inputs arrive.
//! - `Interrupt` — suspend the run, surfacing the payload to the caller.
//!
//! Registration is static per binary: the registry is built once at
//! startup and read-only afterwards. Registering a name twice is an error
//! rather than a silent override.

use crate::error::{EngineError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Current values of a node's read channels, keyed by channel key
/// (`workflow input`, `Node.port`, `Cycle.port`, `Cycle.iteration_counter`).
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    values: Map<String, Value>,
}

impl TaskInput {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Value of a channel, if it was available when the task was formed.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The underlying map, usable directly as expression state.
    pub fn state(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_state(self) -> Map<String, Value> {
        self.values
    }
}

/// Per-invocation configuration delivered to a node function.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Run-scoped thread id (equals the run id under the worker).
    pub thread_id: String,
    /// Workflow metadata, run metadata and node constants, merged in that
    /// order (node constants win).
    pub metadata: Map<String, Value>,
}

/// What a node function produced.
#[derive(Debug, Clone)]
pub enum NodeResult {
    /// Writes keyed by output port name.
    Update(Map<String, Value>),
    /// No writes; re-invoke when more of the node's inputs arrive.
    Empty,
    /// Suspend the run; the payload is surfaced under `__interrupt__`.
    Interrupt(Value),
}

impl NodeResult {
    /// Build an `Update` from `(port, value)` pairs.
    pub fn update<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        NodeResult::Update(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }
}

/// Future returned by a node function.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeResult>> + Send>>;

/// A user-supplied node function.
pub trait NodeFunction: Send + Sync {
    fn call(&self, input: TaskInput, config: NodeConfig) -> NodeFuture;
}

/// Blanket adapter so plain closures register directly.
struct FnNodeFunction<F>(F);

impl<F> NodeFunction for FnNodeFunction<F>
where
    F: Fn(TaskInput, NodeConfig) -> NodeFuture + Send + Sync,
{
    fn call(&self, input: TaskInput, config: NodeConfig) -> NodeFuture {
        (self.0)(input, config)
    }
}

/// Process-wide mapping from `call` names to node functions.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn NodeFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function object under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: Arc<dyn NodeFunction>,
    ) -> Result<()> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(EngineError::DuplicateFunction(name));
        }
        self.functions.insert(name, function);
        Ok(())
    }

    /// Register a closure under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: Fn(TaskInput, NodeConfig) -> NodeFuture + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnNodeFunction(function)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NodeFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> impl Fn(TaskInput, NodeConfig) -> NodeFuture + Send + Sync {
        |input: TaskInput, _config: NodeConfig| {
            Box::pin(async move {
                Ok(NodeResult::update([(
                    "echo",
                    json!(input.state().len()),
                )]))
            })
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("echo", echo()).unwrap();
        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_an_error() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("echo", echo()).unwrap();
        let err = registry.register_fn("echo", echo()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateFunction(name) if name == "echo"));
    }

    #[tokio::test]
    async fn test_calling_a_registered_function() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("echo", echo()).unwrap();

        let function = registry.get("echo").unwrap();
        let mut values = Map::new();
        values.insert("a".into(), json!(1));
        let result = function
            .call(TaskInput::new(values), NodeConfig::default())
            .await
            .unwrap();
        match result {
            NodeResult::Update(update) => assert_eq!(update["echo"], json!(1)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_node_result_update_helper() {
        let result = NodeResult::update([("a", json!(1)), ("b", json!("x"))]);
        match result {
            NodeResult::Update(map) => {
                assert_eq!(map.len(), 2);
                assert_eq!(map["b"], json!("x"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
