//! The workflow IR produced by the parser.
//!
//! These types mirror the surface grammar one-to-one: a [`Workflow`] holds
//! ordered [`Step`]s, each either a [`Node`] (one function invocation with
//! typed ports) or a [`Cycle`] (a bounded sub-graph re-run until its guard
//! holds). Nothing here is evaluated; expressions stay as strings and port
//! defaults stay as literals-or-references for the compiler to resolve.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Reducer tag declared on an output port.
///
/// `Last` keeps the most recent write; `Append` accumulates writes into a
/// list and survives per-iteration clearing inside cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Last,
    Append,
}

/// A literal scalar as it appears in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Duration literal kept verbatim (`24h`); see [`parse_duration`].
    Duration(String),
}

impl Scalar {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Int(n) => serde_json::json!(n),
            Scalar::Float(f) => serde_json::json!(f),
            Scalar::Bool(b) => serde_json::json!(b),
            Scalar::Str(s) => serde_json::json!(s),
            Scalar::Duration(d) => serde_json::json!(d),
        }
    }

    /// String form used for metadata entries.
    pub fn display_string(&self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Str(s) => s.clone(),
            Scalar::Duration(d) => d.clone(),
        }
    }
}

/// Default value of a port: a literal, or a name to resolve.
///
/// A `Ref` is either a bare name (a workflow input, or a cycle-scoped
/// channel when written qualified) or `Producer.port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortValue {
    Literal(Scalar),
    Ref(String),
}

impl PortValue {
    /// The reference text, if this value is a reference.
    pub fn as_ref_str(&self) -> Option<&str> {
        match self {
            PortValue::Ref(s) => Some(s.as_str()),
            PortValue::Literal(_) => None,
        }
    }

    /// True for `Producer.port` style references.
    pub fn is_qualified(&self) -> bool {
        matches!(self, PortValue::Ref(s) if s.contains('.'))
    }
}

/// An input or output port declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDecl {
    /// Symbolic type name; carried through but not enforced.
    pub ty: String,
    pub name: String,
    pub default_value: Option<PortValue>,
    pub optional: bool,
    pub reducer: Reducer,
}

impl PortDecl {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
            default_value: None,
            optional: false,
            reducer: Reducer::Last,
        }
    }
}

/// Workflow metadata block: an ordered key → string map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub entries: BTreeMap<String, String>,
}

/// Human-in-the-loop descriptor on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlConfig {
    pub correlation: String,
    /// Duration literal, e.g. `24h`.
    pub timeout: String,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            correlation: "default".to_string(),
            timeout: "24h".to_string(),
        }
    }
}

/// Retry descriptor on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first invocation.
    pub attempts: u32,
    /// Duration literal for the base backoff, e.g. `1s`.
    pub backoff: String,
    /// `fixed` or `exponential`.
    pub policy: String,
}

/// A per-invocation constant delivered through `config.metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub value: Scalar,
}

/// A single workflow node: one call of a registered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Symbolic function name resolved against the registry.
    pub call: String,
    pub when: Option<String>,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub hitl: Option<HitlConfig>,
    pub retry: Option<RetryConfig>,
    pub constants: Vec<Constant>,
}

impl Node {
    pub fn new(name: impl Into<String>, call: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            call: call.into(),
            when: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            hitl: None,
            retry: None,
            constants: Vec::new(),
        }
    }
}

/// A bounded iterative sub-graph. No nested cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub name: String,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub nodes: Vec<Node>,
    /// Free-form guard expression; the cycle concludes once it holds.
    pub guard: String,
    pub max_iterations: u32,
}

/// Default iteration bound when `max_iterations` is omitted.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Step {
    Node(Node),
    Cycle(Cycle),
}

/// A parsed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub metadata: Option<Metadata>,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Names of the declared workflow inputs.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|p| p.name.as_str())
    }

    /// Top-level nodes (excludes in-cycle nodes).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.steps.iter().filter_map(|s| match s {
            Step::Node(n) => Some(n),
            Step::Cycle(_) => None,
        })
    }

    /// Cycles in declaration order.
    pub fn cycles(&self) -> impl Iterator<Item = &Cycle> {
        self.steps.iter().filter_map(|s| match s {
            Step::Cycle(c) => Some(c),
            Step::Node(_) => None,
        })
    }
}

/// Parse a duration literal (`NNN(s|m|h|d)`) into a [`Duration`].
///
/// Returns `None` for anything that does not match the token grammar.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.len() < 2 {
        return None;
    }
    let (digits, unit) = text.split_at(text.len() - 1);
    let value: u64 = digits.parse().ok()?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_port_value_refs() {
        let qualified = PortValue::Ref("Retrieve.chunks".into());
        assert!(qualified.is_qualified());
        assert_eq!(qualified.as_ref_str(), Some("Retrieve.chunks"));

        let bare = PortValue::Ref("query".into());
        assert!(!bare.is_qualified());

        let lit = PortValue::Literal(Scalar::Int(3));
        assert_eq!(lit.as_ref_str(), None);
    }

    #[test]
    fn test_scalar_json() {
        assert_eq!(Scalar::Int(7).to_json(), serde_json::json!(7));
        assert_eq!(Scalar::Bool(true).to_json(), serde_json::json!(true));
        assert_eq!(Scalar::Str("x".into()).to_json(), serde_json::json!("x"));
    }
}
