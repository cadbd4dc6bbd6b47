//! Graph compiler: Workflow IR → Pregel plan.
//!
//! Compilation is pure; no node function is invoked. The compiler
//! allocates channels, extracts dataflow triggers from port references,
//! replaces each cycle with start/guard scaffolding, validates that every
//! reference resolves and that exactly one sink exists.
//!
//! Cycle compilation replaces `cycle C { … }` with:
//!
//! - `C_cycle_start` — triggered by the cycle's outer inputs and by the
//!   iteration counter. Seeds the counter on first entry, copies the
//!   cycle's inputs into `C.port` channels, clears every non-APPEND
//!   channel produced by the cycle's internal nodes, and refuses to start
//!   an iteration past `max_iterations`.
//! - the internal nodes, compiled like ordinary nodes but scoped so that
//!   `C.port` references resolve to the cycle's channels.
//! - `C_cycle_guard` — triggered by the channels feeding the cycle's
//!   outputs and the guard expression. When the guard holds or the
//!   counter reaches `max_iterations` it maps the cycle's outputs into
//!   `C.port` channels; otherwise it bumps the counter to re-trigger the
//!   start node.
//!
//! The iteration counter is the 1-based index of the running iteration:
//! the start node contributes `+1` on first entry only, the guard writes
//! `+1` to continue. A cycle-private `C.__started__` channel records the
//! last iteration the start node has set up, which keeps the start node
//! idempotent when its own counter write re-triggers it.

use crate::error::{EngineError, Result};
use crate::plan::{
    BodyFuture, BodyOutcome, NodeBody, PlanNode, PregelPlan, ReducerKind, RunConfig, NOOP_NODE,
    START_NODE,
};
use crate::registry::{FunctionRegistry, NodeConfig, NodeFunction, NodeResult, TaskInput};
use crate::retry::RetryPolicy;
use awsl_checkpoint::WriteOp;
use awsl_parser::{
    eval_condition, eval_value, qualified_refs, Cycle, Node, PortDecl, PortValue, Reducer, Step,
    Workflow,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Parse and compile AWSL source in one go.
pub fn compile_source(src: &str, registry: &FunctionRegistry) -> Result<PregelPlan> {
    let workflow = awsl_parser::parse_workflow(src)?;
    compile(&workflow, registry)
}

/// Compile a parsed workflow against a function registry.
pub fn compile(workflow: &Workflow, registry: &FunctionRegistry) -> Result<PregelPlan> {
    Compiler::new(workflow, registry).run()
}

fn counter_key(cycle: &str) -> String {
    format!("{cycle}.iteration_counter")
}

fn started_key(cycle: &str) -> String {
    format!("{cycle}.__started__")
}

/// Evaluate a port default against task state: literals are themselves,
/// references read the named channel.
fn eval_port_value(value: &PortValue, state: &Map<String, Value>) -> Value {
    match value {
        PortValue::Literal(scalar) => scalar.to_json(),
        PortValue::Ref(key) => eval_value(key, state),
    }
}

struct Compiler<'a> {
    workflow: &'a Workflow,
    registry: &'a FunctionRegistry,
    workflow_inputs: HashSet<String>,
    channels: HashMap<String, ReducerKind>,
    nodes: HashMap<String, PlanNode>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> Compiler<'a> {
    fn new(workflow: &'a Workflow, registry: &'a FunctionRegistry) -> Self {
        Self {
            workflow,
            registry,
            workflow_inputs: workflow.input_names().map(str::to_string).collect(),
            channels: HashMap::new(),
            nodes: HashMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    fn run(mut self) -> Result<PregelPlan> {
        self.check_unique_names()?;
        self.allocate_channels();

        for step in &self.workflow.steps {
            match step {
                Step::Node(node) => self.compile_node(node)?,
                Step::Cycle(cycle) => self.compile_cycle(cycle)?,
            }
        }

        self.nodes.insert(
            NOOP_NODE.to_string(),
            PlanNode {
                name: NOOP_NODE.to_string(),
                triggers: Vec::new(),
                reads: Vec::new(),
                writes: Vec::new(),
                run_once: false,
                retry: None,
                body: Arc::new(NoopBody),
            },
        );

        let output_channels = self.output_channels()?;
        let sink = self.find_sink()?;

        let metadata: Map<String, Value> = self
            .workflow
            .metadata
            .as_ref()
            .map(|m| {
                m.entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let dependencies = self
            .dependencies
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect::<Vec<_>>()))
            .collect();

        tracing::debug!(
            workflow = %self.workflow.name,
            channels = self.channels.len(),
            nodes = self.nodes.len(),
            sink = %sink,
            "compiled workflow plan"
        );

        Ok(PregelPlan {
            name: self.workflow.name.clone(),
            channels: self.channels,
            nodes: self.nodes,
            input_channels: self.workflow_inputs.iter().cloned().collect(),
            output_channels,
            metadata,
            dependencies,
            sink,
        })
    }

    fn check_unique_names(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut check = |name: &'a str| -> Result<()> {
            if !seen.insert(name) {
                return Err(EngineError::invalid_workflow(format!(
                    "duplicate name `{name}`"
                )));
            }
            Ok(())
        };
        for step in &self.workflow.steps {
            match step {
                Step::Node(node) => check(&node.name)?,
                Step::Cycle(cycle) => {
                    check(&cycle.name)?;
                    for node in &cycle.nodes {
                        check(&node.name)?;
                    }
                }
            }
        }

        let mut inputs: HashSet<&str> = HashSet::new();
        for port in &self.workflow.inputs {
            if !inputs.insert(&port.name) {
                return Err(EngineError::invalid_workflow(format!(
                    "duplicate workflow input `{}`",
                    port.name
                )));
            }
        }
        Ok(())
    }

    fn allocate_channels(&mut self) {
        for port in &self.workflow.inputs {
            self.channels.insert(port.name.clone(), ReducerKind::Last);
        }
        for port in &self.workflow.outputs {
            self.channels
                .entry(port.name.clone())
                .or_insert(ReducerKind::Last);
        }
        for step in &self.workflow.steps {
            match step {
                Step::Node(node) => self.allocate_node_outputs(node),
                Step::Cycle(cycle) => {
                    self.channels
                        .insert(counter_key(&cycle.name), ReducerKind::Sum);
                    self.channels
                        .insert(started_key(&cycle.name), ReducerKind::Last);
                    for port in cycle.inputs.iter().chain(&cycle.outputs) {
                        self.channels.insert(
                            format!("{}.{}", cycle.name, port.name),
                            ReducerKind::Last,
                        );
                    }
                    for node in &cycle.nodes {
                        self.allocate_node_outputs(node);
                    }
                }
            }
        }
    }

    fn allocate_node_outputs(&mut self, node: &Node) {
        for port in &node.outputs {
            let kind = match port.reducer {
                Reducer::Append => ReducerKind::Append,
                Reducer::Last => ReducerKind::Last,
            };
            self.channels
                .insert(format!("{}.{}", node.name, port.name), kind);
        }
    }

    /// Resolve a top-level reference to (channel key, dependency name).
    fn resolve_top(&self, reference: &str, context: &str) -> Result<(String, String)> {
        if let Some((producer, _)) = reference.split_once('.') {
            if self.channels.contains_key(reference) {
                return Ok((reference.to_string(), producer.to_string()));
            }
            return Err(EngineError::invalid_workflow(format!(
                "reference `{reference}` in `{context}` does not resolve to any output"
            )));
        }
        if self.workflow_inputs.contains(reference) {
            return Ok((reference.to_string(), START_NODE.to_string()));
        }
        Err(EngineError::invalid_workflow(format!(
            "reference `{reference}` in `{context}` is neither a workflow input nor a node output"
        )))
    }

    /// Resolve a reference inside a cycle: cycle-scope channels depend on
    /// the start node, anything else must be a qualified output.
    fn resolve_in_cycle(
        &self,
        reference: &str,
        context: &str,
        cycle_scope: &HashSet<String>,
        start_name: &str,
    ) -> Result<(String, String)> {
        if cycle_scope.contains(reference) {
            return Ok((reference.to_string(), start_name.to_string()));
        }
        if let Some((producer, _)) = reference.split_once('.') {
            if self.channels.contains_key(reference) {
                return Ok((reference.to_string(), producer.to_string()));
            }
        }
        Err(EngineError::invalid_workflow(format!(
            "reference `{reference}` in cycle node `{context}` does not resolve"
        )))
    }

    /// Channel keys of non-optional referenced inputs: the readiness set.
    fn required_channels(ports: &[PortDecl]) -> Vec<String> {
        ports
            .iter()
            .filter(|p| !p.optional)
            .filter_map(|p| p.default_value.as_ref().and_then(PortValue::as_ref_str))
            .map(str::to_string)
            .collect()
    }

    fn compile_node(&mut self, node: &Node) -> Result<()> {
        let (triggers, deps) = self.node_triggers(node, None, None)?;
        self.insert_task_node(node, triggers, deps, true)
    }

    fn node_triggers(
        &self,
        node: &Node,
        cycle_scope: Option<&HashSet<String>>,
        start_name: Option<&str>,
    ) -> Result<(Vec<String>, BTreeSet<String>)> {
        let mut triggers: Vec<String> = Vec::new();
        let mut deps = BTreeSet::new();
        for port in &node.inputs {
            let Some(reference) = port.default_value.as_ref().and_then(PortValue::as_ref_str)
            else {
                continue;
            };
            let (channel, dep) = match (cycle_scope, start_name) {
                (Some(scope), Some(start)) => {
                    self.resolve_in_cycle(reference, &node.name, scope, start)?
                }
                _ => self.resolve_top(reference, &node.name)?,
            };
            if !triggers.contains(&channel) {
                triggers.push(channel);
            }
            deps.insert(dep);
        }
        Ok((triggers, deps))
    }

    fn insert_task_node(
        &mut self,
        node: &Node,
        triggers: Vec<String>,
        deps: BTreeSet<String>,
        run_once: bool,
    ) -> Result<()> {
        let function = self
            .registry
            .get(&node.call)
            .ok_or_else(|| EngineError::FunctionNotProvided(node.call.clone()))?;

        let writes: Vec<String> = node
            .outputs
            .iter()
            .map(|p| format!("{}.{}", node.name, p.name))
            .collect();

        let body = TaskBody {
            node: Arc::new(node.clone()),
            function,
            required: Self::required_channels(&node.inputs),
        };

        self.nodes.insert(
            node.name.clone(),
            PlanNode {
                name: node.name.clone(),
                reads: triggers.clone(),
                triggers,
                writes,
                run_once,
                retry: node.retry.as_ref().map(RetryPolicy::from_config),
                body: Arc::new(body),
            },
        );
        self.dependencies.insert(node.name.clone(), deps);
        Ok(())
    }

    fn compile_cycle(&mut self, cycle: &Cycle) -> Result<()> {
        if cycle.nodes.is_empty() {
            return Err(EngineError::invalid_workflow(format!(
                "cycle `{}` has no nodes",
                cycle.name
            )));
        }

        let start_name = format!("{}_cycle_start", cycle.name);
        let guard_name = format!("{}_cycle_guard", cycle.name);
        let counter = counter_key(&cycle.name);
        let started = started_key(&cycle.name);

        let cycle_scope: HashSet<String> = cycle
            .inputs
            .iter()
            .chain(&cycle.outputs)
            .map(|p| format!("{}.{}", cycle.name, p.name))
            .collect();

        let in_cycle_outputs: HashSet<String> = cycle
            .nodes
            .iter()
            .flat_map(|n| {
                n.outputs
                    .iter()
                    .map(move |p| format!("{}.{}", n.name, p.name))
            })
            .collect();
        let clears: Vec<String> = cycle
            .nodes
            .iter()
            .flat_map(|n| {
                n.outputs
                    .iter()
                    .filter(|p| p.reducer != Reducer::Append)
                    .map(move |p| format!("{}.{}", n.name, p.name))
            })
            .collect();

        // --- start node ---
        let mut start_triggers: Vec<String> = Vec::new();
        let mut start_deps = BTreeSet::new();
        let mut input_mappings: Vec<(String, PortValue)> = Vec::new();
        for port in &cycle.inputs {
            if let Some(value) = &port.default_value {
                input_mappings.push((format!("{}.{}", cycle.name, port.name), value.clone()));
            }
            let Some(reference) = port.default_value.as_ref().and_then(PortValue::as_ref_str)
            else {
                continue;
            };
            // Inputs fed back from inside the cycle are read, not triggered
            // on, so a mid-iteration write cannot restart the cycle.
            if in_cycle_outputs.contains(reference) {
                continue;
            }
            let (channel, dep) = self.resolve_top(reference, &cycle.name)?;
            if !start_triggers.contains(&channel) {
                start_triggers.push(channel);
            }
            start_deps.insert(dep);
        }
        start_triggers.push(counter.clone());
        start_deps.insert(guard_name.clone());

        let mut start_reads = start_triggers.clone();
        start_reads.push(started.clone());
        for (_, value) in &input_mappings {
            if let Some(reference) = value.as_ref_str() {
                if !start_reads.contains(&reference.to_string()) {
                    start_reads.push(reference.to_string());
                }
            }
        }

        let start_body = CycleStartBody {
            counter_key: counter.clone(),
            started_key: started.clone(),
            max_iterations: cycle.max_iterations as i64,
            inputs: input_mappings,
            required: Self::required_channels(&cycle.inputs),
            clears,
        };
        self.nodes.insert(
            start_name.clone(),
            PlanNode {
                name: start_name.clone(),
                triggers: start_triggers,
                reads: start_reads,
                writes: cycle
                    .inputs
                    .iter()
                    .map(|p| format!("{}.{}", cycle.name, p.name))
                    .collect(),
                run_once: false,
                retry: None,
                body: Arc::new(start_body),
            },
        );
        self.dependencies.insert(start_name.clone(), start_deps);

        // --- internal nodes ---
        for node in &cycle.nodes {
            let (triggers, deps) =
                self.node_triggers(node, Some(&cycle_scope), Some(&start_name))?;
            self.insert_task_node(node, triggers, deps, false)?;
        }

        // --- guard node ---
        let mut guard_triggers: Vec<String> = Vec::new();
        let mut guard_deps = BTreeSet::new();
        guard_deps.insert(start_name.clone());
        let mut output_mappings: Vec<(String, PortValue)> = Vec::new();
        for port in &cycle.outputs {
            let Some(value) = &port.default_value else {
                return Err(EngineError::invalid_workflow(format!(
                    "cycle output `{}.{}` must reference a produced channel",
                    cycle.name, port.name
                )));
            };
            output_mappings.push((format!("{}.{}", cycle.name, port.name), value.clone()));
            let Some(reference) = value.as_ref_str() else {
                continue;
            };
            let (channel, dep) =
                self.resolve_in_cycle(reference, &guard_name, &cycle_scope, &start_name)?;
            if !guard_triggers.contains(&channel) {
                guard_triggers.push(channel);
            }
            guard_deps.insert(dep);
        }
        for reference in qualified_refs(&cycle.guard) {
            // Counter and bookkeeping channels are read, never triggered
            // on: the guard must not fire on its own continue signal.
            if reference == counter || reference == started {
                continue;
            }
            if !self.channels.contains_key(&reference) {
                continue;
            }
            if !guard_triggers.contains(&reference) {
                guard_triggers.push(reference.clone());
            }
            if cycle_scope.contains(&reference) {
                guard_deps.insert(start_name.clone());
            } else if let Some((producer, _)) = reference.split_once('.') {
                guard_deps.insert(producer.to_string());
            }
        }

        let mut guard_reads = guard_triggers.clone();
        guard_reads.push(counter.clone());
        for key in in_cycle_outputs.iter().chain(cycle_scope.iter()) {
            if !guard_reads.contains(key) {
                guard_reads.push(key.clone());
            }
        }

        let guard_body = CycleGuardBody {
            counter_key: counter,
            max_iterations: cycle.max_iterations as i64,
            guard_expr: cycle.guard.clone(),
            required: guard_triggers.clone(),
            outputs: output_mappings,
        };
        self.nodes.insert(
            guard_name.clone(),
            PlanNode {
                name: guard_name.clone(),
                triggers: guard_triggers,
                reads: guard_reads,
                writes: cycle
                    .outputs
                    .iter()
                    .map(|p| format!("{}.{}", cycle.name, p.name))
                    .collect(),
                run_once: false,
                retry: None,
                body: Arc::new(guard_body),
            },
        );
        self.dependencies.insert(guard_name, guard_deps);

        Ok(())
    }

    fn output_channels(&self) -> Result<Vec<String>> {
        let mut outputs = Vec::new();
        for port in &self.workflow.outputs {
            match &port.default_value {
                Some(PortValue::Ref(reference)) => {
                    if !self.channels.contains_key(reference) {
                        return Err(EngineError::invalid_workflow(format!(
                            "workflow output `{}` references unknown channel `{reference}`",
                            port.name
                        )));
                    }
                    outputs.push(reference.clone());
                }
                Some(PortValue::Literal(_)) => {
                    return Err(EngineError::invalid_workflow(format!(
                        "workflow output `{}` must reference a produced channel",
                        port.name
                    )));
                }
                None => outputs.push(port.name.clone()),
            }
        }
        for cycle in self.workflow.cycles() {
            outputs.push(counter_key(&cycle.name));
        }
        Ok(outputs)
    }

    fn find_sink(&self) -> Result<String> {
        let consumed: HashSet<&String> = self.dependencies.values().flatten().collect();
        let sinks: Vec<&String> = self
            .dependencies
            .keys()
            .filter(|name| !consumed.contains(*name))
            .collect();
        match sinks.as_slice() {
            [single] => Ok((*single).clone()),
            [] => Err(EngineError::invalid_workflow(format!(
                "no sink node detected in `{}`",
                self.workflow.name
            ))),
            several => Err(EngineError::invalid_workflow(format!(
                "more than one sink node detected: {}",
                several
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// The do-nothing node. Redirect target for readiness gating.
struct NoopBody;

impl NodeBody for NoopBody {
    fn run(&self, _input: TaskInput, _config: &RunConfig) -> BodyFuture {
        Box::pin(async { Ok(BodyOutcome::Writes(Vec::new())) })
    }
}

/// Compiled body of a user node: readiness gate, `when` guard, then the
/// registered function. Output port names are qualified with the node
/// name before the writes reach the channels.
struct TaskBody {
    node: Arc<Node>,
    function: Arc<dyn NodeFunction>,
    required: Vec<String>,
}

impl NodeBody for TaskBody {
    fn run(&self, input: TaskInput, config: &RunConfig) -> BodyFuture {
        for key in &self.required {
            if input.get(key).map_or(true, Value::is_null) {
                return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
            }
        }
        if let Some(when) = &self.node.when {
            if !eval_condition(when, input.state()) {
                tracing::debug!(node = %self.node.name, %when, "when-guard is false");
                return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
            }
        }

        let mut metadata = config.metadata.clone();
        for constant in &self.node.constants {
            metadata.insert(constant.name.clone(), constant.value.to_json());
        }
        let node_config = NodeConfig {
            thread_id: config.thread_id.clone(),
            metadata,
        };

        let name = self.node.name.clone();
        let future = self.function.call(input, node_config);
        Box::pin(async move {
            match future.await? {
                NodeResult::Update(update) => Ok(BodyOutcome::Writes(
                    update
                        .into_iter()
                        .map(|(port, value)| (format!("{name}.{port}"), WriteOp::Put(value)))
                        .collect(),
                )),
                NodeResult::Empty => Ok(BodyOutcome::Empty),
                NodeResult::Interrupt(payload) => Ok(BodyOutcome::Interrupt(payload)),
            }
        })
    }
}

/// Cycle entry/iteration setup.
struct CycleStartBody {
    counter_key: String,
    started_key: String,
    max_iterations: i64,
    inputs: Vec<(String, PortValue)>,
    required: Vec<String>,
    clears: Vec<String>,
}

impl NodeBody for CycleStartBody {
    fn run(&self, input: TaskInput, _config: &RunConfig) -> BodyFuture {
        for key in &self.required {
            if input.get(key).map_or(true, Value::is_null) {
                return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
            }
        }

        let count = input
            .get(&self.counter_key)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let started = input
            .get(&self.started_key)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        // Hard cap: a misbehaving guard cannot start extra iterations.
        if count > self.max_iterations {
            tracing::warn!(
                counter = %self.counter_key,
                count,
                max_iterations = self.max_iterations,
                "iteration counter past its bound, refusing to start"
            );
            return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
        }
        // Already set this iteration up; the trigger was our own write.
        if count > 0 && started >= count {
            return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
        }

        let mut writes: Vec<(String, WriteOp)> = Vec::new();
        if count == 0 {
            writes.push((self.counter_key.clone(), WriteOp::Put(Value::from(1))));
            writes.push((self.started_key.clone(), WriteOp::Put(Value::from(1))));
        } else {
            writes.push((self.started_key.clone(), WriteOp::Put(Value::from(count))));
        }
        for (target, value) in &self.inputs {
            writes.push((
                target.clone(),
                WriteOp::Put(eval_port_value(value, input.state())),
            ));
        }
        for channel in &self.clears {
            writes.push((channel.clone(), WriteOp::Clear));
        }
        Box::pin(async move { Ok(BodyOutcome::Writes(writes)) })
    }
}

/// Cycle exit decision: conclude with mapped outputs, or re-trigger.
struct CycleGuardBody {
    counter_key: String,
    max_iterations: i64,
    guard_expr: String,
    required: Vec<String>,
    outputs: Vec<(String, PortValue)>,
}

impl NodeBody for CycleGuardBody {
    fn run(&self, input: TaskInput, _config: &RunConfig) -> BodyFuture {
        for key in &self.required {
            if input.get(key).map_or(true, Value::is_null) {
                return Box::pin(async { Ok(BodyOutcome::Redirect(NOOP_NODE.to_string())) });
            }
        }

        let count = input
            .get(&self.counter_key)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let writes = if eval_condition(&self.guard_expr, input.state())
            || count >= self.max_iterations
        {
            tracing::debug!(guard = %self.guard_expr, count, "cycle concluding");
            self.outputs
                .iter()
                .map(|(target, value)| {
                    (
                        target.clone(),
                        WriteOp::Put(eval_port_value(value, input.state())),
                    )
                })
                .collect()
        } else {
            vec![(self.counter_key.clone(), WriteOp::Put(Value::from(1)))]
        };
        Box::pin(async move { Ok(BodyOutcome::Writes(writes)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stub_registry(names: &[&str]) -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        for name in names {
            registry
                .register_fn(*name, |_input, _config| {
                    Box::pin(async { Ok(NodeResult::update([("out", json!("x"))])) })
                })
                .unwrap();
        }
        registry
    }

    const LINEAR: &str = r#"
workflow Linear {
    inputs { str query }
    outputs { str answer = B.answer }
    node A {
        call fn_a
        inputs { str query = query }
        outputs { str mid }
    }
    node B {
        call fn_b
        inputs { str mid = A.mid }
        outputs { str answer }
    }
}
"#;

    #[test]
    fn test_linear_plan_channels_and_triggers() {
        let registry = stub_registry(&["fn_a", "fn_b"]);
        let plan = compile_source(LINEAR, &registry).unwrap();

        assert_eq!(plan.channels["query"], ReducerKind::Last);
        assert_eq!(plan.channels["A.mid"], ReducerKind::Last);
        assert_eq!(plan.channels["B.answer"], ReducerKind::Last);

        assert_eq!(plan.nodes["A"].triggers, vec!["query"]);
        assert_eq!(plan.nodes["B"].triggers, vec!["A.mid"]);
        assert!(plan.nodes["A"].run_once);
        assert_eq!(plan.sink, "B");
        assert_eq!(plan.output_channels, vec!["B.answer"]);
        assert!(plan.nodes.contains_key(NOOP_NODE));
    }

    #[test]
    fn test_unknown_function_rejected() {
        let registry = stub_registry(&["fn_a"]);
        let err = compile_source(LINEAR, &registry).unwrap_err();
        assert!(matches!(err, EngineError::FunctionNotProvided(name) if name == "fn_b"));
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let registry = stub_registry(&["fn_a"]);
        let src = r#"
workflow Bad {
    inputs { str query }
    outputs { str out = A.out }
    node A {
        call fn_a
        inputs { str x = Missing.port }
        outputs { str out }
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("Missing.port"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = stub_registry(&["fn_a"]);
        let src = r#"
workflow Dup {
    inputs { str query }
    outputs { str out = A.out }
    node A {
        call fn_a
        inputs { str q = query }
        outputs { str out }
    }
    node A {
        call fn_a
        inputs { str q = query }
        outputs { str out }
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("duplicate name `A`"));
    }

    #[test]
    fn test_multiple_sinks_rejected() {
        let registry = stub_registry(&["fn_a", "fn_b"]);
        let src = r#"
workflow TwoSinks {
    inputs { str query }
    outputs { str out = A.out }
    node A {
        call fn_a
        inputs { str q = query }
        outputs { str out }
    }
    node B {
        call fn_b
        inputs { str q = query }
        outputs { str out }
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("more than one sink"));
        assert!(message.contains('A') && message.contains('B'));
    }

    #[test]
    fn test_zero_sinks_rejected() {
        let registry = stub_registry(&["fn_a", "fn_b"]);
        let src = r#"
workflow NoSink {
    inputs { str query }
    outputs { str out = A.out }
    node A {
        call fn_a
        inputs { str x = B.out }
        outputs { str out }
    }
    node B {
        call fn_b
        inputs { str x = A.out }
        outputs { str out }
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("no sink"));
    }

    const CYCLIC: &str = r#"
workflow Cyclic {
    inputs { str query }
    outputs { str answer = Final.answer }
    node Seed {
        call fn_seed
        inputs { str query = query }
        outputs { str extended }
    }
    cycle Loop {
        inputs { str extended = Seed.extended }
        outputs { list chunks = Fetch.chunks }
        node Fetch {
            call fn_fetch
            inputs { str extended = Loop.extended }
            outputs { list chunks = append }
        }
        node Check {
            call fn_check
            inputs { list chunks = Fetch.chunks }
            outputs { bool is_enough }
        }
        guard Check.is_enough == True
        max_iterations 4
    }
    node Final {
        call fn_final
        inputs {
            str query = query
            list chunks = Loop.chunks
        }
        outputs { str answer }
    }
}
"#;

    #[test]
    fn test_cycle_scaffolding() {
        let registry = stub_registry(&["fn_seed", "fn_fetch", "fn_check", "fn_final"]);
        let plan = compile_source(CYCLIC, &registry).unwrap();

        assert_eq!(plan.channels["Loop.iteration_counter"], ReducerKind::Sum);
        assert_eq!(plan.channels["Fetch.chunks"], ReducerKind::Append);
        assert_eq!(plan.channels["Check.is_enough"], ReducerKind::Last);
        assert_eq!(plan.channels["Loop.extended"], ReducerKind::Last);
        assert_eq!(plan.channels["Loop.chunks"], ReducerKind::Last);

        let start = &plan.nodes["Loop_cycle_start"];
        assert!(start.triggers.contains(&"Seed.extended".to_string()));
        assert!(start.triggers.contains(&"Loop.iteration_counter".to_string()));
        assert!(!start.run_once);

        let guard = &plan.nodes["Loop_cycle_guard"];
        assert!(guard.triggers.contains(&"Fetch.chunks".to_string()));
        assert!(guard.triggers.contains(&"Check.is_enough".to_string()));
        assert!(!guard.triggers.contains(&"Loop.iteration_counter".to_string()));

        let fetch = &plan.nodes["Fetch"];
        assert_eq!(fetch.triggers, vec!["Loop.extended"]);
        assert!(!fetch.run_once);

        // Counters are projected alongside declared outputs.
        assert!(plan
            .output_channels
            .contains(&"Loop.iteration_counter".to_string()));
        assert_eq!(plan.sink, "Final");
    }

    #[test]
    fn test_in_cycle_bare_reference_rejected() {
        let registry = stub_registry(&["fn_fetch"]);
        let src = r#"
workflow Bad {
    inputs { str query }
    outputs { list chunks = Loop.chunks }
    cycle Loop {
        inputs { str query = query }
        outputs { list chunks = Fetch.chunks }
        node Fetch {
            call fn_fetch
            inputs { str query = query }
            outputs { list chunks }
        }
        guard Fetch.chunks != ""
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("does not resolve"));
    }

    #[test]
    fn test_empty_cycle_rejected() {
        let registry = stub_registry(&[]);
        let src = r#"
workflow Empty {
    inputs { str query }
    outputs { str out = Loop.out }
    cycle Loop {
        inputs { str query = query }
        outputs { str out = query }
        guard query != ""
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("has no nodes"));
    }

    #[test]
    fn test_workflow_output_literal_rejected() {
        let registry = stub_registry(&["fn_a"]);
        let src = r#"
workflow Bad {
    inputs { str query }
    outputs { str out = "constant" }
    node A {
        call fn_a
        inputs { str q = query }
        outputs { str out }
    }
}
"#;
        let err = compile_source(src, &registry).unwrap_err();
        assert!(err.to_string().contains("must reference"));
    }
}
