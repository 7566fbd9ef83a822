//! The value shape stored in a single CRDT tree entry (spec §3, §9 "Dynamic
//! value shape"). Modeled as a tagged variant so serialization can write the
//! tag explicitly and round-trip losslessly.

use crate::node::Node;
use serde::{Deserialize, Serialize};

/// A primitive, an opaque byte blob, or a nested CRDT sub-tree.
///
/// `Bytes` is how an external sequence CRDT (rich text, whiteboard strokes)
/// is embedded as an opaque field per spec §1's Non-goals: this core never
/// interprets the bytes, only stores and LWW-resolves them like any other
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    /// All numbers are f64, matching the JSON-compatible wire format.
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Node(Node),
}

impl Value {
    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}
