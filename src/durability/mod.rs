//! Durability hook surface (spec §6 "External Interfaces", §9 "Durability
//! hook boundaries"). This is the external-collaborator interface through
//! which a room loads its initial snapshot and reports op batches and
//! lifecycle breadcrumbs for persistence.
//!
//! Grounded on `history/mod.rs`'s `HistoryProvider` trait: a small async
//! trait object, a redb-backed implementation for real durability, and a
//! no-op implementation for tests and ephemeral deployments.

pub mod noop;
pub mod redb;

use async_trait::async_trait;
use collab_crdt::{Node, Op};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DurabilityError {
    #[error("durability backend I/O error: {0}")]
    Io(String),
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

/// External collaborator contract a room engine calls into (spec §6).
///
/// Implementations must never hold the room's critical section while these
/// run — the room only ever calls them from outside its per-room actor
/// loop, on their own task (spec §9).
#[async_trait]
pub trait DurabilityHook: Send + Sync {
    /// Called on first room construction. Returns `None` if there is no
    /// stored snapshot, or if the stored snapshot can't be decoded
    /// (version mismatch) — the room then starts fresh (spec §6).
    async fn initial_storage(&self, room_id: &str) -> Option<Node>;

    /// Called after every applied op batch. Typically used to debounce and
    /// diff against a snapshot rather than persist per-call.
    async fn on_ops_change(&self, room_id: &str, ops: &[Op]);

    /// Persist a full snapshot. Called from the room's debounced flush
    /// timer (spec §5, default 2s) with a copy of the tree taken under the
    /// room's lock; runs entirely outside it.
    async fn save_snapshot(&self, room_id: &str, root: &Node) -> Result<(), DurabilityError>;

    /// Lifecycle breadcrumb: a connection joined the room.
    async fn on_join(&self, room_id: &str, user_id: &str);

    /// Lifecycle breadcrumb: a connection left the room.
    async fn on_leave(&self, room_id: &str, user_id: &str);
}
