//! The room engine: one actor per collaboration room (spec §4.5), owning a
//! CRDT tree, logical clock, presence/cursor/live-state tables and the set
//! of attached connections. Grounded on `state/actor/mod.rs`'s
//! `ChannelActor` — state owned by an isolated task, driven by an `mpsc`
//! mailbox, one room per core of parallelism.

mod actor;
mod commands;

pub(crate) use commands::RoomCommand;

use crate::config::RoomConfig;
use crate::durability::DurabilityHook;
use crate::envelope::ServerEnvelope;
use crate::presence::{Cursor, LiveStateEntry, Presence};
use collab_crdt::{Node, Op, Value};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Capacity of a connection's outbound mailbox, shared with the gateway so
/// the channel it hands to `attach` matches the bound `broadcast_to_all`
/// enforces (spec §7 `TransportBackpressure`).
pub const OUTBOUND_MAILBOX_CAPACITY: usize = actor::OUTBOUND_MAILBOX_CAPACITY;

pub type RoomId = String;
/// Identifies one attached connection within a room. Stable for the
/// connection's lifetime; a reconnect gets a fresh id (spec §4.5
/// "Reconnection is a fresh attach").
pub type ConnId = Uuid;

/// What a connection presents on join (spec §6's join query plus the
/// optional first-seed payload carried by a `storage:init` envelope).
#[derive(Debug, Clone)]
pub struct JoinPayload {
    pub user_id: String,
    pub display_name: String,
    pub color: Option<String>,
    pub location: Option<String>,
    pub initial_storage: Option<Node>,
}

/// The snapshot handed back to a newly attached connection.
#[derive(Debug, Clone)]
pub struct Welcome {
    pub root: Option<Node>,
    pub presence: HashMap<String, Presence>,
    pub cursors: HashMap<String, Cursor>,
    pub live_state: HashMap<String, LiveStateEntry>,
    pub cursor_throttle_ms: u64,
}

/// A cheaply-cloneable handle to a running room actor. All public operations
/// round-trip through the actor's mailbox so the tree is only ever touched
/// by its own task (spec §5's single-logical-thread-of-execution rule).
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Spawn a fresh room actor. `initial_root` is whatever the durability
    /// hook's `initial_storage` returned when the session manager resolved
    /// this room id, if anything (spec §4.6 "invokes durability's
    /// `initial_storage` hook if the room is new").
    pub(crate) fn spawn(
        id: RoomId,
        config: &RoomConfig,
        initial_root: Option<Node>,
        durability: Arc<dyn DurabilityHook>,
        registry: Weak<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
    ) -> Self {
        let tx = actor::spawn(id.clone(), config, initial_root, durability, registry);
        Self { id, tx }
    }

    pub(crate) fn from_sender(id: RoomId, tx: mpsc::Sender<RoomCommand>) -> Self {
        Self { id, tx }
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<RoomCommand> {
        self.tx.clone()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn attach(
        &self,
        conn_id: ConnId,
        payload: JoinPayload,
        sender: mpsc::Sender<ServerEnvelope>,
    ) -> Option<Welcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Attach {
                conn_id,
                payload,
                sender,
                reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    pub async fn detach(&self, conn_id: ConnId) {
        let _ = self.tx.send(RoomCommand::Detach { conn_id }).await;
    }

    pub async fn seed(&self, conn_id: ConnId, root: Node) {
        let _ = self.tx.send(RoomCommand::Seed { conn_id, root }).await;
    }

    pub async fn ingest_ops(&self, conn_id: ConnId, ops: Vec<Op>) {
        let _ = self.tx.send(RoomCommand::IngestOps { conn_id, ops }).await;
    }

    pub async fn update_presence(&self, conn_id: ConnId, partial: crate::presence::PartialPresence) {
        let _ = self
            .tx
            .send(RoomCommand::UpdatePresence { conn_id, partial })
            .await;
    }

    pub async fn update_cursor(&self, conn_id: ConnId, cursor: Cursor) {
        let _ = self
            .tx
            .send(RoomCommand::UpdateCursor { conn_id, cursor })
            .await;
    }

    pub async fn set_live_state(
        &self,
        conn_id: ConnId,
        key: String,
        value: Value,
        timestamp: f64,
        merge: bool,
    ) {
        let _ = self
            .tx
            .send(RoomCommand::SetLiveState {
                conn_id,
                key,
                value,
                timestamp,
                merge,
            })
            .await;
    }

    pub async fn broadcast(&self, conn_id: ConnId, payload: serde_json::Value) {
        let _ = self
            .tx
            .send(RoomCommand::Broadcast { conn_id, payload })
            .await;
    }

    pub async fn undo(&self, conn_id: ConnId) {
        let _ = self.tx.send(RoomCommand::Undo { conn_id }).await;
    }

    pub async fn redo(&self, conn_id: ConnId) {
        let _ = self.tx.send(RoomCommand::Redo { conn_id }).await;
    }

    /// How long this room has had zero attached connections, if any — a
    /// hook point for a tombstone-GC sweep policy (spec §9 Open Questions),
    /// which this repository deliberately leaves unimplemented (SPEC_FULL
    /// §11): a sweep would poll this and reclaim tombstones older than the
    /// minimum clock across currently attached connections.
    pub async fn quiescent_since(&self) -> Option<Instant> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(RoomCommand::QuiescentSince { reply_tx }).await.is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    /// Flush a final durability snapshot and acknowledge, ahead of process
    /// shutdown (SPEC_FULL §11 "Graceful shutdown"). Does not evict attached
    /// connections; the caller drops its room handles afterward so the
    /// mailbox closes and the actor task exits on its own.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Shutdown { reply_tx }).await.is_err() {
            return;
        }
        let _ = reply_rx.await;
    }
}
