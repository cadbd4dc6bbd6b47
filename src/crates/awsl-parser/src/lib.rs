//! AWSL — a declarative workflow specification language.
//!
//! This crate owns the front half of the engine: tokenizing and parsing
//! AWSL source into the workflow IR, plus the small expression language
//! used by `when` guards, cycle guards and port default mappings.
//!
//! ```text
//! AWSL text ──lexer──> tokens ──parser──> Workflow IR
//!                                            │
//!                             (compiled downstream into a Pregel plan)
//! ```
//!
//! Parsing is pure and deterministic; nothing is evaluated here. The
//! expression evaluator operates later, against live channel state.
//!
//! # Example
//!
//! ```
//! let src = r#"
//! workflow Hello {
//!     inputs { str query }
//!     outputs { str answer = Answer.answer }
//!     node Answer {
//!         call answer
//!         inputs { str query = query }
//!         outputs { str answer }
//!     }
//! }
//! "#;
//! let workflow = awsl_parser::parse_workflow(src).unwrap();
//! assert_eq!(workflow.name, "Hello");
//! ```

pub mod ast;
pub mod error;
pub mod expr;
pub mod parser;
pub mod token;

pub use ast::{
    Constant, Cycle, HitlConfig, Metadata, Node, PortDecl, PortValue, Reducer, RetryConfig, Scalar,
    Step, Workflow, parse_duration, DEFAULT_MAX_ITERATIONS,
};
pub use error::{ParseError, Result};
pub use expr::{eval_condition, eval_value, qualified_refs, State};
pub use parser::{parse_workflow, verify};
