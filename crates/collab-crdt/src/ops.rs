//! The wire op set (spec §4.3) and inverse-op computation for undo.

use crate::clock::Clock;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A path from the tree root to the node an op targets: a sequence of
/// field/key names resolved by successive lookups.
pub type Path = Vec<String>;

/// The mutation ops a client can send, and a room can broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Op {
    #[serde(rename = "set")]
    Set {
        path: Path,
        key: String,
        value: Value,
        clock: Clock,
    },
    #[serde(rename = "delete")]
    Delete { path: Path, key: String, clock: Clock },
    #[serde(rename = "list-insert")]
    ListInsert {
        path: Path,
        position: String,
        value: Value,
        clock: Clock,
    },
    #[serde(rename = "list-delete")]
    ListDelete {
        path: Path,
        position: String,
        clock: Clock,
    },
    #[serde(rename = "list-move")]
    ListMove {
        path: Path,
        from_position: String,
        to_position: String,
        clock: Clock,
    },
}

impl Op {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Op::Set { path, .. }
            | Op::Delete { path, .. }
            | Op::ListInsert { path, .. }
            | Op::ListDelete { path, .. }
            | Op::ListMove { path, .. } => path,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        match self {
            Op::Set { clock, .. }
            | Op::Delete { clock, .. }
            | Op::ListInsert { clock, .. }
            | Op::ListDelete { clock, .. }
            | Op::ListMove { clock, .. } => *clock,
        }
    }

    /// Replace this op's clock field. Used by a room when restamping a
    /// history inverse (spec §4.3: "inverse is `delete` with clock 0, to be
    /// re-stamped on undo") before re-ingesting it.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        match &mut self {
            Op::Set { clock: c, .. }
            | Op::Delete { clock: c, .. }
            | Op::ListInsert { clock: c, .. }
            | Op::ListDelete { clock: c, .. }
            | Op::ListMove { clock: c, .. } => *c = clock,
        }
        self
    }
}
