//! State channels and checkpoint persistence for the AWSL engine.
//!
//! Channels are the shared-state slots of the Pregel plan; each carries a
//! reducer (`LAST`, `SUM`, `APPEND`) that defines how one super-step's
//! writes merge. Checkpoints snapshot every channel plus the engine's
//! trigger bookkeeping so a run can suspend on a human-in-the-loop
//! interrupt and resume later, on any worker.
//!
//! Storage is behind the [`CheckpointSaver`] trait;
//! [`InMemoryCheckpointSaver`] is the in-process reference backend.

pub mod channels;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;

pub use channels::{AppendChannel, Channel, LastValueChannel, SumChannel, WriteOp};
pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata,
    CheckpointSource, CheckpointTuple,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use traits::CheckpointSaver;
