//! Graph compiler and Pregel execution engine for AWSL workflows.
//!
//! The crate takes the workflow IR produced by `awsl-parser` and turns it
//! into a runnable plan:
//!
//! ```text
//! Workflow IR ──compiler──> PregelPlan ──Pregel::invoke──> result map
//!                              │
//!              channels + nodes + triggers + cycle scaffolding
//! ```
//!
//! Node functions are looked up in a [`FunctionRegistry`] built once at
//! startup. Execution is a Pregel-style super-step loop with per-channel
//! reducers, bounded cycles, human-in-the-loop interrupts and
//! checkpoint-backed resume.
//!
//! # Example
//!
//! ```no_run
//! use awsl_core::{compile_source, FunctionRegistry, NodeResult, Pregel, RunConfig, RunInput};
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//!
//! # async fn example() -> awsl_core::Result<()> {
//! let mut registry = FunctionRegistry::new();
//! registry.register_fn("answer", |input, _config| {
//!     Box::pin(async move {
//!         let query = input.get("query").cloned().unwrap_or_default();
//!         Ok(NodeResult::update([("answer", json!(format!("echo: {query}")))]))
//!     })
//! })?;
//!
//! let src = r#"
//! workflow Echo {
//!     inputs { str query }
//!     outputs { str answer = Answer.answer }
//!     node Answer {
//!         call answer
//!         inputs { str query = query }
//!         outputs { str answer }
//!     }
//! }
//! "#;
//! let plan = Arc::new(compile_source(src, &registry)?);
//! let mut engine = Pregel::new(plan);
//!
//! let mut params = Map::new();
//! params.insert("query".into(), json!("hello"));
//! let result = engine
//!     .invoke(RunInput::Start(params), &RunConfig::new("thread-1"))
//!     .await?;
//! assert_eq!(result["Answer.answer"], json!("echo: hello"));
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod error;
pub mod plan;
pub mod pregel;
pub mod registry;
pub mod retry;
pub mod visualize;

pub use compiler::{compile, compile_source};
pub use error::{EngineError, Result};
pub use plan::{
    BodyOutcome, NodeBody, PlanNode, PregelPlan, ReducerKind, RunConfig, DEFAULT_RECURSION_LIMIT,
    INTERRUPT_KEY, NOOP_NODE, START_NODE,
};
pub use pregel::{Pregel, RunInput};
pub use registry::{FunctionRegistry, NodeConfig, NodeFunction, NodeFuture, NodeResult, TaskInput};
pub use retry::RetryPolicy;
pub use visualize::to_mermaid;
