//! CRDT tree node: `Record`, `Map`, `List` (spec §3).
//!
//! All three share the same underlying shape — a sorted map from a string
//! key to a field entry carrying `(value, clock, tombstone?)`. They are
//! distinguished only by schema expectation: `Record` and `Map` are keyed by
//! field/key name, `List` is keyed by a fractional position key, and a
//! `BTreeMap` keyed by that position string already iterates in position
//! order, which is exactly the iteration spec §3 requires of a `List`.

use crate::clock::Clock;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single field entry: the stored value, the clock it was last written
/// (or deleted) at, and whether it is currently tombstoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub clock: Clock,
    #[serde(default)]
    pub tombstone: bool,
}

impl Entry {
    #[must_use]
    pub fn live(value: Value, clock: Clock) -> Self {
        Self {
            value,
            clock,
            tombstone: false,
        }
    }
}

/// The three CRDT node kinds. All carry a `BTreeMap<String, Entry>`; the
/// `kind` tag exists purely to enforce which ops may target the node
/// (spec §4.3's `SchemaViolation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Node {
    Record { entries: BTreeMap<String, Entry> },
    Map { entries: BTreeMap<String, Entry> },
    List { entries: BTreeMap<String, Entry> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Record,
    Map,
    List,
}

impl Node {
    #[must_use]
    pub fn new_record() -> Self {
        Node::Record {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn new_map() -> Self {
        Node::Map {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn new_list() -> Self {
        Node::List {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Record { .. } => NodeKind::Record,
            Node::Map { .. } => NodeKind::Map,
            Node::List { .. } => NodeKind::List,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        match self {
            Node::Record { entries } | Node::Map { entries } | Node::List { entries } => entries,
        }
    }

    pub fn entries_mut(&mut self) -> &mut BTreeMap<String, Entry> {
        match self {
            Node::Record { entries } | Node::Map { entries } | Node::List { entries } => entries,
        }
    }

    /// The maximum clock stored anywhere in this node, recursively.
    ///
    /// Used when grafting a serialized sub-tree: the room clock must be
    /// merged past every clock the grafted sub-tree carries (spec §4.3).
    #[must_use]
    pub fn max_clock(&self) -> Clock {
        self.entries()
            .values()
            .map(|entry| {
                let nested = entry.value.as_node().map_or(Clock::ZERO, Node::max_clock);
                entry.clock.max(nested)
            })
            .max()
            .unwrap_or(Clock::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_iterates_in_position_order() {
        let mut list = Node::new_list();
        list.entries_mut()
            .insert("b".to_string(), Entry::live(Value::from("second"), Clock(1)));
        list.entries_mut()
            .insert("a".to_string(), Entry::live(Value::from("first"), Clock(1)));
        let ordered: Vec<_> = list.entries().keys().collect();
        assert_eq!(ordered, vec!["a", "b"]);
    }

    #[test]
    fn max_clock_recurses_into_nested_nodes() {
        let mut inner = Node::new_record();
        inner
            .entries_mut()
            .insert("x".to_string(), Entry::live(Value::Number(1.0), Clock(9)));

        let mut outer = Node::new_record();
        outer
            .entries_mut()
            .insert("child".to_string(), Entry::live(Value::Node(inner), Clock(3)));

        assert_eq!(outer.max_clock(), Clock(9));
    }
}
