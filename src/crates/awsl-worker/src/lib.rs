//! Durable run queue and worker pool for AWSL workflows.
//!
//! Runs are rows in a `workflow_runs` table. The API layer creates them
//! `queued`; workers claim them with `FOR UPDATE SKIP LOCKED` (at most
//! one worker per run), execute them through the Pregel engine, heartbeat
//! while running, and persist the outcome. A run that interrupts for
//! human input parks as `needs_input` until a resume payload flips it
//! back to `queued`; the checkpointer then delivers the saved channel
//! state to whichever worker picks it up.
//!
//! The [`RunStore`] and [`CheckpointSaver`] seams each have a Postgres
//! implementation for production and an in-memory one for tests.

pub mod checkpoint_store;
pub mod error;
pub mod example_functions;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod store;
pub mod templates;

pub use checkpoint_store::PgCheckpointSaver;
pub use error::{Result, WorkerError};
pub use memory::MemoryRunStore;
pub use models::{RunState, WorkflowRun};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use postgres::PgRunStore;
pub use store::RunStore;
pub use templates::{get_template, list_templates, TemplateInfo};
