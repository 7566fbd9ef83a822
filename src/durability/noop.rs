//! No-op durability hook. All operations succeed but persist nothing —
//! used when durability is disabled or for tests (mirrors
//! `history/noop.rs`'s `NoOpProvider`).

use super::{DurabilityError, DurabilityHook};
use async_trait::async_trait;
use collab_crdt::{Node, Op};

pub struct NoOpDurability;

#[async_trait]
impl DurabilityHook for NoOpDurability {
    async fn initial_storage(&self, _room_id: &str) -> Option<Node> {
        None
    }

    async fn on_ops_change(&self, _room_id: &str, _ops: &[Op]) {}

    async fn save_snapshot(&self, _room_id: &str, _root: &Node) -> Result<(), DurabilityError> {
        Ok(())
    }

    async fn on_join(&self, _room_id: &str, _user_id: &str) {}

    async fn on_leave(&self, _room_id: &str, _user_id: &str) {}
}
