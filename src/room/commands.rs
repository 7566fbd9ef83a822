//! The mailbox message set a room actor processes (spec §4.5's public
//! operations), mirroring `ChannelEvent`'s shape: one variant per operation,
//! `oneshot` reply channels where the caller needs a value back.

use super::{ConnId, JoinPayload, Welcome};
use crate::envelope::ServerEnvelope;
use crate::presence::{Cursor, PartialPresence};
use collab_crdt::{Node, Op, Value};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

pub enum RoomCommand {
    Attach {
        conn_id: ConnId,
        payload: JoinPayload,
        sender: mpsc::Sender<ServerEnvelope>,
        reply_tx: oneshot::Sender<Welcome>,
    },
    Detach {
        conn_id: ConnId,
    },
    /// A `storage:init` envelope arriving after attach — the wire-level
    /// seeding path (spec §4.6's `storage:init`, "first-seed only").
    Seed {
        conn_id: ConnId,
        root: Node,
    },
    IngestOps {
        conn_id: ConnId,
        ops: Vec<Op>,
    },
    UpdatePresence {
        conn_id: ConnId,
        partial: PartialPresence,
    },
    UpdateCursor {
        conn_id: ConnId,
        cursor: Cursor,
    },
    SetLiveState {
        conn_id: ConnId,
        key: String,
        value: Value,
        timestamp: f64,
        merge: bool,
    },
    Broadcast {
        conn_id: ConnId,
        payload: serde_json::Value,
    },
    Undo {
        conn_id: ConnId,
    },
    Redo {
        conn_id: ConnId,
    },
    QuiescentSince {
        reply_tx: oneshot::Sender<Option<Instant>>,
    },
    /// Graceful-shutdown signal (SPEC_FULL §11): flush durably and exit,
    /// regardless of whether connections remain attached.
    Shutdown {
        reply_tx: oneshot::Sender<()>,
    },
}
