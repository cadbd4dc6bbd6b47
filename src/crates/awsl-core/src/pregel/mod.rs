//! Pregel-style execution engine.
//!
//! Execution proceeds in super-steps. Each super-step:
//!
//! 1. collects the nodes whose trigger channels received new writes since
//!    they last ran (plus any redirect targets from the previous step),
//! 2. snapshots each ready node's read channels into its task input and
//!    runs the bodies concurrently,
//! 3. applies the collected writes through the channels' reducers in one
//!    atomic batch, bumping channel versions.
//!
//! When a super-step schedules nothing, the run has reached its fixpoint
//! and the declared output channels are projected into the result.
//!
//! Writes emitted in super-step *t* are observable by every node executed
//! in super-step ≥ *t+1*; no ordering is promised among concurrent writes
//! within a step beyond their reduction.
//!
//! Interrupts, cancellation and the per-run recursion limit are handled
//! by [`Pregel`] in [`loop_impl`]; the scheduling and write-application
//! primitives live in [`algo`].

pub mod algo;
pub mod loop_impl;

pub use algo::{apply_writes, prepare_next_tasks, ReadyTask, TaskWrites};
pub use loop_impl::{Pregel, RunInput};
