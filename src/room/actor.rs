//! The room actor: one task per room, owning its CRDT tree, clock, presence,
//! cursors and live-state (spec §4.5, §5 "one room processed by a single
//! logical thread of execution"). Grounded on `ChannelActor`'s mailbox loop
//! and `cleanup_if_empty`'s self-eviction from the owning registry.

use super::commands::RoomCommand;
use super::{ConnId, JoinPayload, RoomId, Welcome};
use crate::config::RoomConfig;
use crate::durability::DurabilityHook;
use crate::envelope::ServerEnvelope;
use crate::metrics;
use crate::presence::{Cursor, LiveStateEntry, OnlineStatus, PartialPresence, Presence};
use collab_crdt::{ApplyOutcome, CrdtTree, HistoryManager, LogicalClock, Node, Op};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct ConnectionState {
    user_id: String,
    sender: mpsc::Sender<ServerEnvelope>,
    history: HistoryManager,
}

/// Per-connection outbound mailbox capacity. Bounded so a slow reader's
/// queue can actually fill up: spec §7's `TransportBackpressure` ("peer
/// queue full, peer is dropped") only means something against a bounded
/// channel. An unbounded channel here would let a stuck client grow memory
/// without limit instead of ever triggering the drop spec.md asks for.
pub(crate) const OUTBOUND_MAILBOX_CAPACITY: usize = 256;

pub(crate) struct RoomActor {
    id: RoomId,
    tree: Option<CrdtTree>,
    clock: LogicalClock,
    connections: HashMap<ConnId, ConnectionState>,
    presence: HashMap<ConnId, Presence>,
    cursors: HashMap<ConnId, Cursor>,
    live_state: HashMap<String, LiveStateEntry>,
    history_cap: usize,
    cursor_throttle_ms: u64,
    durability: Arc<dyn DurabilityHook>,
    flush_interval: Duration,
    dirty: bool,
    quiescent_since: Option<Instant>,
    registry: Weak<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
}

/// Mailbox capacity for a room's command channel. A burst of ops from one
/// fast client should not block others; once full, `ingest_ops` callers back
/// off the way any bounded-mpsc sender does (spec §5's transport
/// back-pressure is the only back-pressure).
const MAILBOX_CAPACITY: usize = 256;

pub(crate) fn spawn(
    id: RoomId,
    config: &RoomConfig,
    initial_root: Option<Node>,
    durability: Arc<dyn DurabilityHook>,
    registry: Weak<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
) -> mpsc::Sender<RoomCommand> {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

    let mut clock = LogicalClock::new();
    let tree = initial_root.map(|root| {
        clock.merge(root.max_clock());
        CrdtTree::from_root(root)
    });

    let actor = RoomActor {
        id,
        tree,
        clock,
        connections: HashMap::new(),
        presence: HashMap::new(),
        cursors: HashMap::new(),
        live_state: HashMap::new(),
        history_cap: config.history_cap,
        cursor_throttle_ms: config.cursor_throttle_ms,
        durability,
        flush_interval: Duration::from_millis(config.flush_debounce_ms),
        dirty: false,
        quiescent_since: None,
        registry,
    };

    tokio::spawn(actor.run(rx));
    tx
}

impl RoomActor {
    #[tracing::instrument(skip(self, rx), fields(room_id = %self.id))]
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        metrics::ACTIVE_ROOMS.inc();
        let mut flush_ticker = tokio::time::interval(self.flush_interval);
        flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so we don't flush an empty room.
        flush_ticker.tick().await;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = flush_ticker.tick() => {
                    self.maybe_flush();
                }
            }
            if self.connections.is_empty() && self.quiescent_since.is_some() {
                break;
            }
        }

        self.final_flush().await;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        metrics::ACTIVE_ROOMS.dec();
        tracing::info!(room_id = %self.id, "room destroyed");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Attach {
                conn_id,
                payload,
                sender,
                reply_tx,
            } => self.handle_attach(conn_id, payload, sender, reply_tx).await,
            RoomCommand::Seed { conn_id, root } => self.handle_seed(conn_id, root),
            RoomCommand::Detach { conn_id } => self.handle_detach(conn_id).await,
            RoomCommand::IngestOps { conn_id, ops } => self.handle_ingest_ops(conn_id, ops).await,
            RoomCommand::UpdatePresence { conn_id, partial } => {
                self.handle_update_presence(conn_id, partial);
            }
            RoomCommand::UpdateCursor { conn_id, cursor } => {
                self.handle_update_cursor(conn_id, cursor);
            }
            RoomCommand::SetLiveState {
                conn_id,
                key,
                value,
                timestamp,
                merge,
            } => self.handle_set_live_state(conn_id, key, value, timestamp, merge),
            RoomCommand::Broadcast { conn_id, payload } => self.handle_broadcast(conn_id, payload),
            RoomCommand::Undo { conn_id } => self.handle_undo(conn_id).await,
            RoomCommand::Redo { conn_id } => self.handle_redo(conn_id).await,
            RoomCommand::QuiescentSince { reply_tx } => {
                let _ = reply_tx.send(self.quiescent_since);
            }
            RoomCommand::Shutdown { reply_tx } => {
                self.final_flush().await;
                let _ = reply_tx.send(());
            }
        }
    }

    async fn handle_attach(
        &mut self,
        conn_id: ConnId,
        payload: JoinPayload,
        sender: mpsc::Sender<ServerEnvelope>,
        reply_tx: tokio::sync::oneshot::Sender<Welcome>,
    ) {
        // Initialization race (spec §4.5): only the first seed (durability's,
        // or whichever client arrives first) wins. Later `initial_storage`
        // payloads are silently dropped because the tree is already Some.
        if self.tree.is_none() {
            if let Some(root) = payload.initial_storage.clone() {
                self.clock.merge(root.max_clock());
                self.tree = Some(CrdtTree::from_root(root));
                self.dirty = true;
            }
        }

        let presence = Presence {
            user_id: payload.user_id.clone(),
            display_name: payload.display_name.clone(),
            color: payload.color.clone(),
            online_status: OnlineStatus::Online,
            location: payload.location.clone(),
            metadata: HashMap::new(),
        };
        self.presence.insert(conn_id, presence);
        self.connections.insert(
            conn_id,
            ConnectionState {
                user_id: payload.user_id.clone(),
                sender,
                history: HistoryManager::new(self.history_cap),
            },
        );
        self.quiescent_since = None;
        metrics::CONNECTED_CLIENTS.inc();

        let welcome = Welcome {
            root: self.tree.as_ref().map(|t| t.root().clone()),
            presence: self.presence_by_string(),
            cursors: self.cursors_by_string(),
            live_state: self.live_state.clone(),
            cursor_throttle_ms: self.cursor_throttle_ms,
        };
        let _ = reply_tx.send(welcome);

        self.broadcast_presence(Some(conn_id));

        let durability = Arc::clone(&self.durability);
        let room_id = self.id.clone();
        let user_id = payload.user_id;
        tokio::spawn(async move { durability.on_join(&room_id, &user_id).await });
    }

    /// Wire-triggered seeding (spec §4.6 `storage:init`, §4.5 "initialization
    /// race"): the first `storage:init` to reach an un-seeded room wins;
    /// every later one is a silent no-op (`StaleSeed`, spec §7).
    fn handle_seed(&mut self, conn_id: ConnId, root: Node) {
        if self.tree.is_some() {
            let err = crate::error::RoomError::AlreadySeeded;
            tracing::debug!(room_id = %self.id, conn_id = %conn_id, error = %err, error_code = err.error_code(), "dropped");
            return;
        }
        self.clock.merge(root.max_clock());
        self.tree = Some(CrdtTree::from_root(root.clone()));
        self.dirty = true;

        self.broadcast_to_all(
            ServerEnvelope::StorageInit {
                root: Some(root),
                presence: self.presence_by_string(),
                cursors: self.cursors_by_string(),
                live_state: self.live_state.clone(),
                cursor_throttle_ms: self.cursor_throttle_ms,
            },
            Some(conn_id),
        );
    }

    async fn handle_detach(&mut self, conn_id: ConnId) {
        let user_id = self.connections.remove(&conn_id).map(|c| c.user_id);
        self.presence.remove(&conn_id);
        self.cursors.remove(&conn_id);
        metrics::CONNECTED_CLIENTS.dec();

        if self.connections.is_empty() {
            self.quiescent_since = Some(Instant::now());
        } else {
            self.broadcast_presence(None);
        }

        if let Some(user_id) = user_id {
            let durability = Arc::clone(&self.durability);
            let room_id = self.id.clone();
            tokio::spawn(async move { durability.on_leave(&room_id, &user_id).await });
        }
    }

    async fn handle_ingest_ops(&mut self, conn_id: ConnId, ops: Vec<Op>) {
        let Some(tree) = self.tree.as_mut() else {
            tracing::trace!(room_id = %self.id, "ops ingested before room seeded, dropped");
            return;
        };
        if !self.connections.contains_key(&conn_id) {
            let err = crate::error::RoomError::UnknownConnection(conn_id.to_string());
            tracing::debug!(room_id = %self.id, error = %err, error_code = err.error_code(), "dropped");
            return;
        }

        let batched = ops.len() > 1;
        if batched {
            self.connections.get_mut(&conn_id).unwrap().history.start_batch();
        }

        let mut applied = Vec::with_capacity(ops.len());
        for op in &ops {
            // The client-supplied clock stays on the op and is what the tree
            // compares against stored state (LWW authority, spec §9); the
            // room clock only orders the outbound broadcast.
            match tree.apply(op) {
                ApplyOutcome::Applied { inverse } => {
                    metrics::OPS_APPLIED.inc();
                    // Merge past the client-supplied clock (invariant 4,
                    // spec §3) and, when the op grafts a serialized
                    // sub-tree, past every clock that sub-tree carries
                    // internally too (spec §4.3) — a bare `tick()` here
                    // would let a grafted node's clock exceed the room
                    // clock.
                    self.clock.merge(op.clock());
                    if let Some(node) = grafted_node(op) {
                        self.clock.merge(node.max_clock());
                    }
                    self.connections
                        .get_mut(&conn_id)
                        .unwrap()
                        .history
                        .record(op.clone(), inverse);
                    applied.push(op.clone());
                }
                ApplyOutcome::Dropped(reason) => {
                    metrics::OPS_DROPPED.inc();
                    tracing::trace!(room_id = %self.id, conn_id = %conn_id, ?reason, "op dropped");
                }
            }
        }

        if batched {
            self.connections.get_mut(&conn_id).unwrap().history.end_batch();
        }

        // One coalesced notification for the whole batch, not one per op
        // (spec §4.3 "Notifications are coalesced").
        tree.notify_subscribers();

        if applied.is_empty() {
            return;
        }
        self.dirty = true;
        let room_clock = self.clock.current().0;
        self.broadcast_to_all(
            ServerEnvelope::StorageOps {
                ops: applied.clone(),
                clock: room_clock,
            },
            Some(conn_id),
        );
        self.report_ops_change(applied);
    }

    fn handle_update_presence(&mut self, conn_id: ConnId, partial: PartialPresence) {
        if let Some(presence) = self.presence.get_mut(&conn_id) {
            presence.merge(partial);
            self.broadcast_presence(Some(conn_id));
        }
    }

    fn handle_update_cursor(&mut self, conn_id: ConnId, cursor: Cursor) {
        if !self.connections.contains_key(&conn_id) {
            return;
        }
        self.cursors.insert(conn_id, cursor);
        self.broadcast_to_all(
            ServerEnvelope::Cursors {
                cursors: self.cursors_by_string(),
            },
            Some(conn_id),
        );
    }

    fn handle_set_live_state(
        &mut self,
        conn_id: ConnId,
        key: String,
        value: collab_crdt::Value,
        timestamp: f64,
        merge: bool,
    ) {
        let Some(conn) = self.connections.get(&conn_id) else {
            return;
        };
        let user_id = conn.user_id.clone();

        if let Some(existing) = self.live_state.get(&key) {
            if timestamp < existing.timestamp {
                return;
            }
        }

        let (resolved_value, owner) = match self.live_state.get(&key) {
            Some(existing) => {
                let resolved = if merge {
                    LiveStateEntry::merged_value(&existing.value, value)
                } else {
                    value
                };
                (resolved, existing.owner.clone())
            }
            None => (value, user_id.clone()),
        };

        self.live_state.insert(
            key,
            LiveStateEntry {
                value: resolved_value,
                timestamp,
                owner,
                last_writer: user_id,
            },
        );
        self.broadcast_to_all(
            ServerEnvelope::LiveState {
                entries: self.live_state.clone(),
            },
            None,
        );
    }

    fn handle_broadcast(&mut self, conn_id: ConnId, payload: serde_json::Value) {
        self.broadcast_to_all(ServerEnvelope::Message { payload }, Some(conn_id));
    }

    async fn handle_undo(&mut self, conn_id: ConnId) {
        let Some(conn) = self.connections.get_mut(&conn_id) else {
            return;
        };
        let Some(ops) = conn.history.undo() else {
            return;
        };
        self.apply_restamped(ops);
    }

    async fn handle_redo(&mut self, conn_id: ConnId) {
        let Some(conn) = self.connections.get_mut(&conn_id) else {
            return;
        };
        let Some(ops) = conn.history.redo() else {
            return;
        };
        self.apply_restamped(ops);
    }

    /// Re-stamp and re-apply history's inverse/forward ops (the history
    /// entries were captured against past state and may now be stale;
    /// `HistoryManager::undo`'s contract requires the caller to give them a
    /// fresh clock before replay). Broadcast to every connection, including
    /// the one that triggered undo/redo, since the room computed these ops
    /// on its behalf.
    fn apply_restamped(&mut self, ops: Vec<Op>) {
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let mut applied = Vec::with_capacity(ops.len());
        for op in ops {
            let fresh = self.clock.tick();
            let restamped = op.with_clock(fresh);
            match tree.apply(&restamped) {
                ApplyOutcome::Applied { .. } => {
                    metrics::OPS_APPLIED.inc();
                    applied.push(restamped);
                }
                ApplyOutcome::Dropped(reason) => {
                    metrics::OPS_DROPPED.inc();
                    tracing::trace!(room_id = %self.id, ?reason, "undo/redo op dropped");
                }
            }
        }
        tree.notify_subscribers();
        if applied.is_empty() {
            return;
        }
        self.dirty = true;
        let room_clock = self.clock.current().0;
        self.broadcast_to_all(
            ServerEnvelope::StorageOps {
                ops: applied.clone(),
                clock: room_clock,
            },
            None,
        );
        self.report_ops_change(applied);
    }

    fn report_ops_change(&self, ops: Vec<Op>) {
        let durability = Arc::clone(&self.durability);
        let room_id = self.id.clone();
        tokio::spawn(async move { durability.on_ops_change(&room_id, &ops).await });
    }

    fn maybe_flush(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(tree) = &self.tree else {
            return;
        };
        self.dirty = false;
        let root = tree.root().clone();
        let durability = Arc::clone(&self.durability);
        let room_id = self.id.clone();
        tokio::spawn(async move { save_and_record(durability, room_id, root).await });
    }

    async fn final_flush(&self) {
        if let Some(tree) = &self.tree {
            save_and_record(Arc::clone(&self.durability), self.id.clone(), tree.root().clone())
                .await;
        }
    }

    fn broadcast_presence(&mut self, exclude: Option<ConnId>) {
        self.broadcast_to_all(
            ServerEnvelope::Presence {
                presence: self.presence_by_string(),
            },
            exclude,
        );
    }

    /// Send `envelope` to every attached connection but `exclude`. A
    /// connection whose mailbox is full or whose reader has already gone
    /// away is dropped outright (spec §7 `TransportBackpressure`: "peer is
    /// dropped"). The drop is applied after the broadcast loop finishes, so
    /// the send fan-out itself never mutates `self.connections` mid-iteration.
    fn broadcast_to_all(&mut self, envelope: ServerEnvelope, exclude: Option<ConnId>) {
        let mut backpressured = Vec::new();
        for (id, conn) in &self.connections {
            if Some(*id) == exclude {
                continue;
            }
            match conn.sender.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(room_id = %self.id, conn_id = %id, "outbound mailbox full, dropping connection");
                    backpressured.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Reader already tore down; its own detach will run
                    // independently, nothing to drop here.
                }
            }
        }
        for id in backpressured {
            metrics::BACKPRESSURE_DROPPED.inc();
            self.connections.remove(&id);
            self.presence.remove(&id);
            self.cursors.remove(&id);
            metrics::CONNECTED_CLIENTS.dec();
        }
    }

    fn presence_by_string(&self) -> HashMap<String, Presence> {
        self.presence
            .iter()
            .map(|(id, presence)| (id.to_string(), presence.clone()))
            .collect()
    }

    fn cursors_by_string(&self) -> HashMap<String, Cursor> {
        self.cursors
            .iter()
            .map(|(id, cursor)| (id.to_string(), cursor.clone()))
            .collect()
    }
}

/// The nested sub-tree an op grafts into the target node, if any (only
/// `set` and `list-insert` carry a `value`). Used to merge the room clock
/// past every clock a grafted sub-tree carries internally (spec §4.3).
fn grafted_node(op: &Op) -> Option<&Node> {
    match op {
        Op::Set { value, .. } | Op::ListInsert { value, .. } => value.as_node(),
        _ => None,
    }
}

async fn save_and_record(durability: Arc<dyn DurabilityHook>, room_id: RoomId, root: Node) {
    match durability.save_snapshot(&room_id, &root).await {
        Ok(()) => metrics::DURABILITY_FLUSH_SUCCESS.inc(),
        Err(e) => {
            tracing::warn!(room_id = %room_id, error = %e, "durability flush failed");
            metrics::DURABILITY_FLUSH_FAILURE.inc();
        }
    }
}
