//! Wire envelope shapes (spec §4.6). Self-delimited structured documents
//! tagged by `type`, serialized as JSON over the WebSocket transport.

use crate::presence::{Cursor, PartialPresence, Presence};
use collab_crdt::{Node, Op};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Query parameters on the client join URL (spec §6):
/// `/<base>/<room_id>?user_id=...&display_name=...&color=...&location=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinQuery {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// A client-to-server envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEnvelope {
    #[serde(rename = "storage:init")]
    StorageInit { root: Node },
    #[serde(rename = "storage:ops")]
    StorageOps { ops: Vec<Op> },
    #[serde(rename = "presence:update")]
    PresenceUpdate {
        #[serde(flatten)]
        partial: PartialPresence,
    },
    #[serde(rename = "cursor:update")]
    CursorUpdate {
        x: f64,
        y: f64,
        #[serde(default)]
        viewport: Option<crate::presence::Viewport>,
    },
    #[serde(rename = "live-state:set")]
    LiveStateSet {
        key: String,
        value: collab_crdt::Value,
        timestamp: f64,
        #[serde(default)]
        merge: bool,
    },
    #[serde(rename = "message")]
    Message { payload: serde_json::Value },
    /// Replay the most recent undoable entry from this connection's
    /// server-held history (spec §4.4; no listed wire trigger in §4.6, added
    /// here since the history stack has to be reachable from somewhere).
    #[serde(rename = "undo")]
    Undo,
    #[serde(rename = "redo")]
    Redo,
}

/// A server-to-client envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    #[serde(rename = "storage:init")]
    StorageInit {
        root: Option<Node>,
        presence: HashMap<String, Presence>,
        cursors: HashMap<String, Cursor>,
        live_state: HashMap<String, crate::presence::LiveStateEntry>,
        /// Echoed so clients know the cadence the server expects for their
        /// own cursor updates (spec §6) — the room itself never throttles.
        cursor_throttle_ms: u64,
    },
    #[serde(rename = "storage:ops")]
    StorageOps { ops: Vec<Op>, clock: u64 },
    #[serde(rename = "presence")]
    Presence { presence: HashMap<String, Presence> },
    #[serde(rename = "cursors")]
    Cursors { cursors: HashMap<String, Cursor> },
    #[serde(rename = "live-state")]
    LiveState {
        entries: HashMap<String, crate::presence::LiveStateEntry>,
    },
    #[serde(rename = "message")]
    Message { payload: serde_json::Value },
    #[serde(rename = "error")]
    Error { reason: String },
}
