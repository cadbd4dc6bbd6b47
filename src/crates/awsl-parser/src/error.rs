//! Error types for AWSL parsing.

use thiserror::Error;

/// Convenience result type using [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors produced while tokenizing or parsing AWSL source.
///
/// Every variant carries the 1-based line and column of the offending
/// position so callers (the verifier, the worker) can report it verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The parser met a token it did not expect.
    #[error("syntax error at line {line}, column {column}: found {found}, expected {}", expected.join(" | "))]
    Syntax {
        line: u32,
        column: u32,
        /// Human-readable description of the offending token.
        found: String,
        /// The set of tokens that would have been accepted here.
        expected: Vec<String>,
    },

    /// A structurally invalid declaration (e.g. a node without `call`,
    /// a cycle without `guard`, `max_iterations 0`).
    #[error("invalid declaration at line {line}, column {column}: {message}")]
    Invalid {
        line: u32,
        column: u32,
        message: String,
    },

    /// A string literal ran to end of input without a closing quote.
    #[error("unterminated string literal starting at line {line}, column {column}")]
    UnterminatedString { line: u32, column: u32 },

    /// A numeric literal that does not fit the token grammar.
    #[error("malformed number at line {line}, column {column}: {text}")]
    MalformedNumber {
        line: u32,
        column: u32,
        text: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(
        line: u32,
        column: u32,
        found: impl Into<String>,
        expected: &[&str],
    ) -> Self {
        ParseError::Syntax {
            line,
            column,
            found: found.into(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub(crate) fn invalid(line: u32, column: u32, message: impl Into<String>) -> Self {
        ParseError::Invalid {
            line,
            column,
            message: message.into(),
        }
    }
}
