//! Checkpoint data structures.
//!
//! A [`Checkpoint`] is the complete per-run engine state at a super-step
//! boundary: channel snapshots, channel versions, what each node has seen,
//! run-once bookkeeping, and the pending interrupt if one is outstanding.
//! All state is scoped by `thread_id`; runs never share checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Monotonic channel version used for trigger bookkeeping.
pub type ChannelVersion = u64;

/// Mapping from channel key to version.
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// Origin of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written when the run's initial parameters were applied.
    Input,
    /// Written from inside the super-step loop.
    Loop,
    /// Written when a resume payload was applied.
    Resume,
}

/// Metadata stored alongside a checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,
    /// Super-step number at the time of the snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, step: u64) -> Self {
        Self {
            source: Some(source),
            step: Some(step),
        }
    }
}

/// Complete engine state at a super-step boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version.
    pub v: i32,
    pub id: String,
    pub ts: DateTime<Utc>,
    /// Channel key → reducer snapshot.
    pub channel_values: HashMap<String, serde_json::Value>,
    pub channel_versions: ChannelVersions,
    /// Node name → channel versions it had consumed when it last ran.
    pub versions_seen: HashMap<String, ChannelVersions>,
    /// Channels updated by the most recent super-step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_channels: Option<Vec<String>>,
    /// Nodes that have committed a real execution (run-once gating).
    #[serde(default)]
    pub nodes_run: HashSet<String>,
    /// Node whose interrupt suspended the run, when one is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted_node: Option<String>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn empty() -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            channel_values: HashMap::new(),
            channel_versions: HashMap::new(),
            versions_seen: HashMap::new(),
            updated_channels: None,
            nodes_run: HashSet::new(),
            interrupted_node: None,
        }
    }

    /// Highest version currently assigned to any channel.
    pub fn max_version(&self) -> ChannelVersion {
        self.channel_versions.values().copied().max().unwrap_or(0)
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::empty()
    }
}

/// Identifies where a checkpoint is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Run-scoped thread id. All saved state lives under it.
    pub thread_id: String,
}

impl CheckpointConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

/// A checkpoint plus its config and metadata, as stored.
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
}
