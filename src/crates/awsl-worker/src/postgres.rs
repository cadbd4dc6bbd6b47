//! Postgres-backed run store.
//!
//! The claim protocol is a single statement combining `FOR UPDATE SKIP
//! LOCKED` selection with the state transition, which yields
//! at-most-one-worker-per-run without contention across the pool: each
//! poller locks a different candidate row or skips past locked ones.

use crate::error::{Result, WorkerError};
use crate::models::{RunState, WorkflowRun};
use crate::store::RunStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_runs (
    id              TEXT PRIMARY KEY,
    graph_name      TEXT NOT NULL,
    thread_id       TEXT NOT NULL UNIQUE,
    state           TEXT NOT NULL DEFAULT 'queued',
    query           TEXT,
    result          JSONB,
    error           TEXT,
    worker_id       TEXT,
    attempt         INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    started_at      TIMESTAMPTZ,
    heartbeat_at    TIMESTAMPTZ,
    finished_at     TIMESTAMPTZ,
    resume_payload  JSONB,
    CHECK (state IN ('queued', 'running', 'needs_input', 'failed', 'succeeded', 'canceled'))
);
CREATE INDEX IF NOT EXISTS workflow_runs_state_idx ON workflow_runs (state, id);
"#;

/// `workflow_runs` on Postgres.
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `workflow_runs` table and indexes if missing.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(&self, graph_name: &str, query: &str) -> Result<WorkflowRun> {
        let id = Uuid::new_v4().to_string();
        let run = sqlx::query_as::<_, WorkflowRun>(
            "INSERT INTO workflow_runs (id, graph_name, thread_id, state, query)
             VALUES ($1, $2, $1, 'queued', $3)
             RETURNING *",
        )
        .bind(&id)
        .bind(graph_name)
        .bind(query)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(run_id = %run.id, graph = %graph_name, "run queued");
        Ok(run)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<WorkflowRun>> {
        let run = sqlx::query_as::<_, WorkflowRun>(
            "WITH next AS (
                 SELECT id
                 FROM workflow_runs
                 WHERE state = 'queued'
                 ORDER BY id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE workflow_runs
             SET state = 'running',
                 worker_id = $1,
                 started_at = now(),
                 heartbeat_at = now(),
                 attempt = attempt + 1
             FROM next
             WHERE workflow_runs.id = next.id
             RETURNING workflow_runs.*",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    async fn heartbeat(&self, run_id: &str) -> Result<()> {
        sqlx::query("UPDATE workflow_runs SET heartbeat_at = now() WHERE id = $1 AND state = 'running'")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        let run = sqlx::query_as::<_, WorkflowRun>("SELECT * FROM workflow_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    async fn list(&self) -> Result<Vec<WorkflowRun>> {
        let runs =
            sqlx::query_as::<_, WorkflowRun>("SELECT * FROM workflow_runs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(runs)
    }

    async fn complete(
        &self,
        run_id: &str,
        state: RunState,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE workflow_runs
             SET state = $2,
                 finished_at = CASE WHEN $2 IN ('succeeded', 'failed', 'canceled')
                                    THEN now() ELSE finished_at END,
                 error = $3,
                 result = COALESCE($4, result),
                 resume_payload = NULL
             WHERE id = $1",
        )
        .bind(run_id)
        .bind(state.as_str())
        .bind(&error)
        .bind(&result)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(WorkerError::RunNotFound(run_id.to_string()));
        }
        tracing::info!(run_id = %run_id, state = %state, "run completed");
        Ok(())
    }

    async fn resume(&self, run_id: &str, payload: Value) -> Result<WorkflowRun> {
        let run = sqlx::query_as::<_, WorkflowRun>(
            "UPDATE workflow_runs
             SET state = 'queued', resume_payload = $2, error = NULL
             WHERE id = $1 AND state = 'needs_input'
             RETURNING *",
        )
        .bind(run_id)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;
        match run {
            Some(run) => Ok(run),
            None => match self.get(run_id).await? {
                Some(existing) => Err(WorkerError::InvalidTransition {
                    run_id: run_id.to_string(),
                    from: existing.run_state(),
                    to: RunState::Queued,
                }),
                None => Err(WorkerError::RunNotFound(run_id.to_string())),
            },
        }
    }

    async fn cancel(&self, run_id: &str) -> Result<WorkflowRun> {
        let run = sqlx::query_as::<_, WorkflowRun>(
            "UPDATE workflow_runs
             SET state = 'canceled', finished_at = now()
             WHERE id = $1 AND state IN ('queued', 'running')
             RETURNING *",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        match run {
            Some(run) => Ok(run),
            None => match self.get(run_id).await? {
                Some(existing) => Err(WorkerError::InvalidTransition {
                    run_id: run_id.to_string(),
                    from: existing.run_state(),
                    to: RunState::Canceled,
                }),
                None => Err(WorkerError::RunNotFound(run_id.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercises the live claim protocol. Needs a reachable Postgres:
    //   DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_claim_protocol_against_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgRunStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();

        let run = store.create_run("it_test", "hello").await.unwrap();
        let claimed = store.claim_next("it-worker").await.unwrap().unwrap();
        assert_eq!(claimed.id, run.id);
        assert_eq!(claimed.run_state(), RunState::Running);

        store
            .complete(&run.id, RunState::Succeeded, None, None)
            .await
            .unwrap();
        let done = store.get(&run.id).await.unwrap().unwrap();
        assert_eq!(done.run_state(), RunState::Succeeded);
    }
}
