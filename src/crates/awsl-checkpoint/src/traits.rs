//! The checkpoint storage abstraction.
//!
//! [`CheckpointSaver`] is the seam between the engine and persistence.
//! The engine writes one checkpoint per super-step under the run's
//! `thread_id` and reads the latest back when resuming after a
//! human-in-the-loop interrupt. Backends only need three operations;
//! everything else (what is in a checkpoint, when it is taken) is the
//! engine's business.
//!
//! The in-memory implementation in [`crate::memory`] backs tests; the
//! worker crate provides a Postgres-backed implementation for production.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use async_trait::async_trait;

/// Storage backend for per-thread checkpoints.
///
/// Implementations must be `Send + Sync`; distinct `thread_id`s must have
/// fully independent histories (cross-run isolation).
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist a checkpoint for the config's thread.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<()>;

    /// Latest checkpoint tuple for the config's thread, if any.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Latest checkpoint for the config's thread, if any.
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Drop all state saved under `thread_id`.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
