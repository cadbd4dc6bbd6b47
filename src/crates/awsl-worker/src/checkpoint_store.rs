//! Postgres-backed checkpoint saver.
//!
//! Channel state is stored one row per super-step under the run's
//! `thread_id`; the latest row is the resume point. The engine treats
//! the stored JSON as opaque.

use async_trait::async_trait;
use awsl_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointTuple,
};
use sqlx::postgres::PgPool;
use sqlx::Row;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_checkpoints (
    seq         BIGSERIAL PRIMARY KEY,
    thread_id   TEXT NOT NULL,
    checkpoint  JSONB NOT NULL,
    metadata    JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS workflow_checkpoints_thread_idx
    ON workflow_checkpoints (thread_id, seq DESC);
"#;

/// Checkpoint persistence in a `workflow_checkpoints` table.
#[derive(Debug, Clone)]
pub struct PgCheckpointSaver {
    pool: PgPool,
}

impl PgCheckpointSaver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkpoint table and index if missing.
    pub async fn migrate(&self) -> Result<(), CheckpointError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }
}

fn storage_error(error: sqlx::Error) -> CheckpointError {
    CheckpointError::Storage(error.to_string())
}

#[async_trait]
impl CheckpointSaver for PgCheckpointSaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<(), CheckpointError> {
        let checkpoint_json = serde_json::to_value(&checkpoint)?;
        let metadata_json = serde_json::to_value(&metadata)?;
        sqlx::query(
            "INSERT INTO workflow_checkpoints (thread_id, checkpoint, metadata)
             VALUES ($1, $2, $3)",
        )
        .bind(&config.thread_id)
        .bind(checkpoint_json)
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_tuple(
        &self,
        config: &CheckpointConfig,
    ) -> Result<Option<CheckpointTuple>, CheckpointError> {
        let row = sqlx::query(
            "SELECT checkpoint, metadata
             FROM workflow_checkpoints
             WHERE thread_id = $1
             ORDER BY seq DESC
             LIMIT 1",
        )
        .bind(&config.thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let checkpoint: Checkpoint =
            serde_json::from_value(row.try_get("checkpoint").map_err(storage_error)?)?;
        let metadata: CheckpointMetadata =
            serde_json::from_value(row.try_get("metadata").map_err(storage_error)?)?;
        Ok(Some(CheckpointTuple {
            config: config.clone(),
            checkpoint,
            metadata,
        }))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM workflow_checkpoints WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
