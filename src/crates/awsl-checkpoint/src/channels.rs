//! Channel implementations: the state slots of the Pregel plan.
//!
//! A channel is a named slot of shared state written at super-step
//! boundaries and observed through its reducer. Three reducers exist:
//!
//! - [`LastValueChannel`] (`LAST`) keeps the most recent non-null write.
//! - [`SumChannel`] (`SUM`) accumulates integers monotonically; backs
//!   cycle iteration counters.
//! - [`AppendChannel`] (`APPEND`) concatenates writes into a list in the
//!   order issued; survives per-iteration clearing inside cycles.
//!
//! Writes arrive as [`WriteOp`]s so clearing is explicit rather than an
//! in-band sentinel value: the cycle-start scaffolding emits
//! [`WriteOp::Clear`] to reset non-APPEND channels between iterations.

use crate::error::{CheckpointError, Result};
use serde_json::Value;
use std::fmt::Debug;

/// A single write applied to a channel at super-step end.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Merge a value through the channel's reducer.
    Put(Value),
    /// Reset the channel to its empty state.
    Clear,
}

/// Reducer state container keyed by channel name in the engine.
pub trait Channel: Send + Sync + Debug {
    /// Current value, or `None` when the channel is empty.
    fn get(&self) -> Option<Value>;

    /// Apply one super-step's writes in the order they were issued.
    /// Returns `true` if the observable state changed.
    fn update(&mut self, ops: Vec<WriteOp>) -> Result<bool>;

    /// Serializable snapshot of the channel state.
    fn checkpoint(&self) -> Value;

    /// Restore from a snapshot produced by [`Channel::checkpoint`].
    fn restore(&mut self, snapshot: Value) -> Result<()>;

    /// Whether the channel currently holds a value.
    fn is_available(&self) -> bool {
        self.get().is_some()
    }

    fn clone_box(&self) -> Box<dyn Channel>;
}

impl Clone for Box<dyn Channel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// `LAST`: the most recent non-null write wins.
///
/// Null writes are ignored so a super-step in which every writer produced
/// null leaves the previous value in place; `Clear` resets to empty.
#[derive(Debug, Clone, Default)]
pub struct LastValueChannel {
    value: Option<Value>,
}

impl LastValueChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

impl Channel for LastValueChannel {
    fn get(&self) -> Option<Value> {
        self.value.clone()
    }

    fn update(&mut self, ops: Vec<WriteOp>) -> Result<bool> {
        let mut changed = false;
        for op in ops {
            match op {
                WriteOp::Put(Value::Null) => {}
                WriteOp::Put(value) => {
                    self.value = Some(value);
                    changed = true;
                }
                WriteOp::Clear => {
                    changed = self.value.is_some() || changed;
                    self.value = None;
                }
            }
        }
        Ok(changed)
    }

    fn checkpoint(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }

    fn restore(&mut self, snapshot: Value) -> Result<()> {
        self.value = match snapshot {
            Value::Null => None,
            other => Some(other),
        };
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}

/// `SUM`: integer accumulation. Used for cycle iteration counters, where
/// the start node seeds `+1` and the guard writes `+1` to continue.
#[derive(Debug, Clone, Default)]
pub struct SumChannel {
    value: Option<i64>,
}

impl SumChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated total, zero when never written.
    pub fn total(&self) -> i64 {
        self.value.unwrap_or(0)
    }
}

impl Channel for SumChannel {
    fn get(&self) -> Option<Value> {
        self.value.map(Value::from)
    }

    fn update(&mut self, ops: Vec<WriteOp>) -> Result<bool> {
        let mut changed = false;
        for op in ops {
            match op {
                WriteOp::Put(Value::Null) => {}
                WriteOp::Put(value) => {
                    let increment = value.as_i64().ok_or_else(|| {
                        CheckpointError::Invalid(format!(
                            "SUM channel takes integer writes, got {value}"
                        ))
                    })?;
                    self.value = Some(self.value.unwrap_or(0) + increment);
                    changed = true;
                }
                WriteOp::Clear => {
                    changed = self.value.is_some() || changed;
                    self.value = None;
                }
            }
        }
        Ok(changed)
    }

    fn checkpoint(&self) -> Value {
        self.value.map(Value::from).unwrap_or(Value::Null)
    }

    fn restore(&mut self, snapshot: Value) -> Result<()> {
        self.value = match snapshot {
            Value::Null => None,
            other => Some(other.as_i64().ok_or_else(|| {
                CheckpointError::Invalid("SUM channel snapshot must be an integer".to_string())
            })?),
        };
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}

/// `APPEND`: concatenates writes into a list in issue order.
///
/// An array write extends the list, any other value is pushed as one
/// element. Empty channels read as unavailable so readiness gating treats
/// a never-written accumulator like any other missing dependency.
#[derive(Debug, Clone, Default)]
pub struct AppendChannel {
    items: Vec<Value>,
}

impl AppendChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

impl Channel for AppendChannel {
    fn get(&self) -> Option<Value> {
        if self.items.is_empty() {
            None
        } else {
            Some(Value::Array(self.items.clone()))
        }
    }

    fn update(&mut self, ops: Vec<WriteOp>) -> Result<bool> {
        let mut changed = false;
        for op in ops {
            match op {
                WriteOp::Put(Value::Null) => {}
                WriteOp::Put(Value::Array(values)) => {
                    changed = changed || !values.is_empty();
                    self.items.extend(values);
                }
                WriteOp::Put(value) => {
                    self.items.push(value);
                    changed = true;
                }
                WriteOp::Clear => {
                    changed = !self.items.is_empty() || changed;
                    self.items.clear();
                }
            }
        }
        Ok(changed)
    }

    fn checkpoint(&self) -> Value {
        Value::Array(self.items.clone())
    }

    fn restore(&mut self, snapshot: Value) -> Result<()> {
        match snapshot {
            Value::Null => {
                self.items.clear();
                Ok(())
            }
            Value::Array(items) => {
                self.items = items;
                Ok(())
            }
            _ => Err(CheckpointError::Invalid(
                "APPEND channel snapshot must be an array".to_string(),
            )),
        }
    }

    fn clone_box(&self) -> Box<dyn Channel> {
        Box::new(self.clone())
    }
}
