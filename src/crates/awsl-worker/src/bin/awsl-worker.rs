//! Worker daemon: polls the run queue and executes workflow runs.

use anyhow::Context;
use awsl_worker::{example_functions, PgCheckpointSaver, PgRunStore, WorkerPool, WorkerPoolConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "awsl-worker", about = "Run queued AWSL workflows", version)]
struct Args {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Directory scanned for `.awsl` workflow templates.
    #[arg(long, env = "AWSL_WORKFLOWS_DIR", default_value = "workflows")]
    workflows_dir: PathBuf,

    /// Worker pool size.
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    /// Seconds to sleep when the queue is empty.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Seconds between heartbeats while a run executes.
    #[arg(long, default_value_t = 10)]
    heartbeat_interval: u64,

    /// Per-run super-step limit.
    #[arg(long, default_value_t = 100)]
    recursion_limit: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let store = PgRunStore::connect(&args.database_url)
        .await
        .context("connecting to the run database")?;
    store.migrate().await.context("migrating workflow_runs")?;

    let checkpointer = PgCheckpointSaver::new(store.pool().clone());
    checkpointer
        .migrate()
        .await
        .context("migrating workflow_checkpoints")?;

    let registry = Arc::new(example_functions::registry().context("building function registry")?);

    let config = WorkerPoolConfig {
        concurrency: args.workers,
        poll_interval: Duration::from_secs(args.poll_interval),
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
        workflows_dir: args.workflows_dir,
        recursion_limit: args.recursion_limit,
    };
    tracing::info!(
        workers = config.concurrency,
        workflows_dir = %config.workflows_dir.display(),
        "starting worker pool"
    );

    let pool = WorkerPool::new(
        Arc::new(store),
        Arc::new(checkpointer),
        registry,
        config,
    );
    pool.run().await;
    Ok(())
}
