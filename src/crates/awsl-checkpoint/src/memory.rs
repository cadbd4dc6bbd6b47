//! In-memory checkpoint saver.
//!
//! Reference implementation of [`CheckpointSaver`] used by tests and
//! single-process runs. Keeps the full history per thread so the latest
//! snapshot is a vector tail.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe in-memory checkpoint store.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointSaver {
    threads: RwLock<HashMap<String, Vec<CheckpointTuple>>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for a thread.
    pub fn history_len(&self, thread_id: &str) -> usize {
        self.threads
            .read()
            .expect("checkpoint lock poisoned")
            .get(thread_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<()> {
        let mut threads = self.threads.write().expect("checkpoint lock poisoned");
        threads
            .entry(config.thread_id.clone())
            .or_default()
            .push(CheckpointTuple {
                config: config.clone(),
                checkpoint,
                metadata,
            });
        Ok(())
    }

    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let threads = self.threads.read().expect("checkpoint lock poisoned");
        Ok(threads
            .get(&config.thread_id)
            .and_then(|history| history.last())
            .cloned())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.threads
            .write()
            .expect("checkpoint lock poisoned")
            .remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_latest() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new("thread-1");

        let mut first = Checkpoint::empty();
        first.channel_versions.insert("a".into(), 1);
        saver
            .put(&config, first, CheckpointMetadata::default())
            .await
            .unwrap();

        let mut second = Checkpoint::empty();
        second.channel_versions.insert("a".into(), 2);
        saver
            .put(&config, second, CheckpointMetadata::default())
            .await
            .unwrap();

        let latest = saver.get(&config).await.unwrap().unwrap();
        assert_eq!(latest.channel_versions["a"], 2);
        assert_eq!(saver.history_len("thread-1"), 2);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let saver = InMemoryCheckpointSaver::new();
        saver
            .put(
                &CheckpointConfig::new("a"),
                Checkpoint::empty(),
                CheckpointMetadata::default(),
            )
            .await
            .unwrap();

        assert!(saver
            .get(&CheckpointConfig::new("b"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::new("gone");
        saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::default())
            .await
            .unwrap();
        saver.delete_thread("gone").await.unwrap();
        assert!(saver.get(&config).await.unwrap().is_none());
    }
}
