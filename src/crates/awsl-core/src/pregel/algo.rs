//! Core Pregel primitives: task scheduling and write application.
//!
//! Triggering is version-based. Every channel carries a monotonically
//! increasing version; each node records the versions of its trigger
//! channels as of its last execution. A node is ready when any trigger
//! channel's version is ahead of what the node has seen.

use crate::error::Result;
use crate::plan::PlanNode;
use crate::registry::TaskInput;
use awsl_checkpoint::{Channel, Checkpoint, WriteOp};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Writes produced by one task in a super-step.
#[derive(Debug, Clone)]
pub struct TaskWrites {
    pub name: String,
    /// Channel-key-qualified write operations, in issue order.
    pub writes: Vec<(String, WriteOp)>,
    /// Trigger channels consumed by this task (versions-seen update).
    pub triggers: Vec<String>,
}

impl TaskWrites {
    /// A marker with no writes: records trigger consumption only.
    pub fn marker(name: impl Into<String>, triggers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            writes: Vec::new(),
            triggers,
        }
    }
}

/// A node scheduled for the coming super-step.
#[derive(Debug, Clone)]
pub struct ReadyTask {
    pub name: String,
    pub input: TaskInput,
    pub triggers: Vec<String>,
}

/// Apply one super-step's writes atomically.
///
/// Tasks are ordered by name first so reduction order is deterministic;
/// the per-task write order is preserved within each channel. Every
/// channel that changed gets the same fresh version. Returns the set of
/// updated channels, which is also recorded on the checkpoint for the
/// next scheduling pass.
pub fn apply_writes(
    checkpoint: &mut Checkpoint,
    channels: &mut HashMap<String, Box<dyn Channel>>,
    tasks: Vec<TaskWrites>,
) -> Result<HashSet<String>> {
    let mut tasks = tasks;
    tasks.sort_by(|a, b| a.name.cmp(&b.name));

    for task in &tasks {
        let seen = checkpoint
            .versions_seen
            .entry(task.name.clone())
            .or_default();
        for trigger in &task.triggers {
            if let Some(version) = checkpoint.channel_versions.get(trigger) {
                seen.insert(trigger.clone(), *version);
            }
        }
    }

    let next_version = checkpoint.max_version() + 1;

    let mut pending: BTreeMap<String, Vec<WriteOp>> = BTreeMap::new();
    for task in &tasks {
        for (channel, op) in &task.writes {
            if !channels.contains_key(channel) {
                tracing::warn!(task = %task.name, channel = %channel, "write to unknown channel dropped");
                continue;
            }
            pending.entry(channel.clone()).or_default().push(op.clone());
        }
    }

    let mut updated = HashSet::new();
    for (key, ops) in pending {
        if let Some(channel) = channels.get_mut(&key) {
            if channel.update(ops)? {
                checkpoint.channel_versions.insert(key.clone(), next_version);
                updated.insert(key);
            }
        }
    }

    let mut updated_list: Vec<String> = updated.iter().cloned().collect();
    updated_list.sort_unstable();
    checkpoint.updated_channels = Some(updated_list);

    Ok(updated)
}

/// Schedule the next super-step's tasks.
///
/// Candidates come from the channels updated by the previous step (via
/// the trigger index); each candidate runs when some trigger channel's
/// version is ahead of what the node has seen. `pushed` nodes (redirect
/// targets) are scheduled unconditionally with no triggers.
pub fn prepare_next_tasks(
    checkpoint: &Checkpoint,
    nodes: &HashMap<String, PlanNode>,
    channels: &HashMap<String, Box<dyn Channel>>,
    updated: Option<&HashSet<String>>,
    trigger_to_nodes: &HashMap<String, Vec<String>>,
    pushed: &[String],
) -> Vec<ReadyTask> {
    let candidates: Vec<String> = match updated {
        Some(updated) if !updated.is_empty() => {
            let mut triggered = BTreeSet::new();
            for channel in updated {
                if let Some(names) = trigger_to_nodes.get(channel) {
                    triggered.extend(names.iter().cloned());
                }
            }
            triggered.into_iter().collect()
        }
        _ if checkpoint.channel_versions.is_empty() => Vec::new(),
        _ => {
            let mut all: Vec<String> = nodes.keys().cloned().collect();
            all.sort_unstable();
            all
        }
    };

    let mut tasks = Vec::new();
    let mut scheduled: HashSet<String> = HashSet::new();

    for name in candidates {
        let Some(node) = nodes.get(&name) else {
            continue;
        };
        let seen = checkpoint.versions_seen.get(&name);
        let should_trigger = node.triggers.iter().any(|trigger| {
            let current = checkpoint
                .channel_versions
                .get(trigger)
                .copied()
                .unwrap_or(0);
            let last = seen.and_then(|s| s.get(trigger)).copied().unwrap_or(0);
            current > last
        });
        if should_trigger && scheduled.insert(name.clone()) {
            tasks.push(ReadyTask {
                input: read_task_input(node, channels),
                triggers: node.triggers.clone(),
                name,
            });
        }
    }

    for name in pushed {
        let Some(node) = nodes.get(name) else {
            tracing::warn!(node = %name, "redirect to unknown node ignored");
            continue;
        };
        if scheduled.insert(name.clone()) {
            tasks.push(ReadyTask {
                name: name.clone(),
                input: read_task_input(node, channels),
                triggers: Vec::new(),
            });
        }
    }

    tasks
}

/// Snapshot a node's read channels into its task input. Channels without
/// a value are simply absent from the map.
fn read_task_input(node: &PlanNode, channels: &HashMap<String, Box<dyn Channel>>) -> TaskInput {
    let mut values = Map::new();
    for key in &node.reads {
        if let Some(value) = channels.get(key).and_then(|c| c.get()) {
            values.insert(key.clone(), value);
        }
    }
    TaskInput::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{BodyFuture, BodyOutcome, NodeBody, RunConfig};
    use awsl_checkpoint::LastValueChannel;
    use serde_json::json;
    use std::sync::Arc;

    struct Idle;
    impl NodeBody for Idle {
        fn run(&self, _input: TaskInput, _config: &RunConfig) -> BodyFuture {
            Box::pin(async { Ok(BodyOutcome::Writes(Vec::new())) })
        }
    }

    fn plan_node(name: &str, triggers: &[&str]) -> PlanNode {
        PlanNode {
            name: name.to_string(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            reads: triggers.iter().map(|s| s.to_string()).collect(),
            writes: Vec::new(),
            run_once: false,
            retry: None,
            body: Arc::new(Idle),
        }
    }

    fn channel_map(keys: &[&str]) -> HashMap<String, Box<dyn Channel>> {
        keys.iter()
            .map(|k| {
                (
                    k.to_string(),
                    Box::new(LastValueChannel::new()) as Box<dyn Channel>,
                )
            })
            .collect()
    }

    #[test]
    fn test_apply_writes_bumps_versions() {
        let mut checkpoint = Checkpoint::empty();
        let mut channels = channel_map(&["state"]);

        let task = TaskWrites {
            name: "writer".into(),
            writes: vec![("state".into(), WriteOp::Put(json!(42)))],
            triggers: vec![],
        };
        let updated = apply_writes(&mut checkpoint, &mut channels, vec![task]).unwrap();

        assert!(updated.contains("state"));
        assert_eq!(checkpoint.channel_versions["state"], 1);
        assert_eq!(channels["state"].get(), Some(json!(42)));
        assert_eq!(
            checkpoint.updated_channels,
            Some(vec!["state".to_string()])
        );
    }

    #[test]
    fn test_apply_writes_unknown_channel_dropped() {
        let mut checkpoint = Checkpoint::empty();
        let mut channels = channel_map(&["state"]);
        let task = TaskWrites {
            name: "writer".into(),
            writes: vec![("ghost".into(), WriteOp::Put(json!(1)))],
            triggers: vec![],
        };
        let updated = apply_writes(&mut checkpoint, &mut channels, vec![task]).unwrap();
        assert!(updated.is_empty());
    }

    #[test]
    fn test_apply_writes_records_versions_seen() {
        let mut checkpoint = Checkpoint::empty();
        checkpoint.channel_versions.insert("input".into(), 3);
        let mut channels = channel_map(&["input"]);

        let task = TaskWrites::marker("consumer", vec!["input".into()]);
        apply_writes(&mut checkpoint, &mut channels, vec![task]).unwrap();

        assert_eq!(checkpoint.versions_seen["consumer"]["input"], 3);
    }

    #[test]
    fn test_version_triggering() {
        let mut checkpoint = Checkpoint::empty();
        checkpoint.channel_versions.insert("input".into(), 1);
        let mut channels = channel_map(&["input"]);
        channels
            .get_mut("input")
            .unwrap()
            .update(vec![WriteOp::Put(json!("x"))])
            .unwrap();

        let mut nodes = HashMap::new();
        nodes.insert("process".to_string(), plan_node("process", &["input"]));
        let trigger_to_nodes: HashMap<String, Vec<String>> =
            [("input".to_string(), vec!["process".to_string()])]
                .into_iter()
                .collect();

        // Unseen version: ready.
        let tasks = prepare_next_tasks(&checkpoint, &nodes, &channels, None, &trigger_to_nodes, &[]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].input.get("input"), Some(&json!("x")));

        // Seen: idle.
        checkpoint.versions_seen.insert(
            "process".into(),
            [("input".to_string(), 1u64)].into_iter().collect(),
        );
        let tasks = prepare_next_tasks(&checkpoint, &nodes, &channels, None, &trigger_to_nodes, &[]);
        assert!(tasks.is_empty());

        // Version bumped again: ready again.
        checkpoint.channel_versions.insert("input".into(), 2);
        let tasks = prepare_next_tasks(&checkpoint, &nodes, &channels, None, &trigger_to_nodes, &[]);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_updated_channel_filter() {
        let mut checkpoint = Checkpoint::empty();
        checkpoint.channel_versions.insert("a".into(), 1);
        checkpoint.channel_versions.insert("b".into(), 1);
        let channels = channel_map(&["a", "b"]);

        let mut nodes = HashMap::new();
        nodes.insert("na".to_string(), plan_node("na", &["a"]));
        nodes.insert("nb".to_string(), plan_node("nb", &["b"]));
        let trigger_to_nodes: HashMap<String, Vec<String>> = [
            ("a".to_string(), vec!["na".to_string()]),
            ("b".to_string(), vec!["nb".to_string()]),
        ]
        .into_iter()
        .collect();

        let updated: HashSet<String> = ["a".to_string()].into_iter().collect();
        let tasks = prepare_next_tasks(
            &checkpoint,
            &nodes,
            &channels,
            Some(&updated),
            &trigger_to_nodes,
            &[],
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "na");
    }

    #[test]
    fn test_pushed_tasks_scheduled_unconditionally() {
        let checkpoint = Checkpoint::empty();
        let channels = channel_map(&[]);
        let mut nodes = HashMap::new();
        nodes.insert("noop".to_string(), plan_node("noop", &[]));

        let tasks = prepare_next_tasks(
            &checkpoint,
            &nodes,
            &channels,
            None,
            &HashMap::new(),
            &["noop".to_string()],
        );
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].triggers.is_empty());
    }

    #[test]
    fn test_empty_checkpoint_schedules_nothing() {
        let checkpoint = Checkpoint::empty();
        let channels = channel_map(&[]);
        let nodes = HashMap::new();
        let tasks =
            prepare_next_tasks(&checkpoint, &nodes, &channels, None, &HashMap::new(), &[]);
        assert!(tasks.is_empty());
    }
}
