//! Session manager (spec §4.6): owns the room registry and resolves each
//! connection to its room, invoking the durability hook's `initial_storage`
//! on first construction. Grounded on `state/matrix.rs`'s manager-delegating
//! coordinator and `state/managers/channel.rs`'s `DashMap`-keyed
//! get-or-create actor registry, stripped down to the one table collabd
//! actually needs.

use crate::config::RoomConfig;
use crate::durability::DurabilityHook;
use crate::room::{RoomCommand, RoomHandle, RoomId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Central coordinator every gateway connection resolves its room through.
pub struct SessionManager {
    rooms: Arc<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
    config: RoomConfig,
    durability: Arc<dyn DurabilityHook>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: RoomConfig, durability: Arc<dyn DurabilityHook>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            config,
            durability,
        }
    }

    /// Resolve an existing room, or construct one — invoking the durability
    /// hook's `initial_storage` exactly once, at construction (spec §4.6).
    pub async fn get_or_create_room(&self, room_id: &str) -> RoomHandle {
        if let Some(tx) = self.rooms.get(room_id) {
            return RoomHandle::from_sender(room_id.to_string(), tx.clone());
        }

        // Two connections racing to create the same room both reach here;
        // the loser's `initial_storage` lookup is wasted work but harmless —
        // `entry()` below only keeps the handle that wins the insert race,
        // mirroring `ChannelManager::get_or_create_actor`'s own unguarded
        // check-then-insert.
        let initial_root = self.durability.initial_storage(room_id).await;
        let registry = Arc::downgrade(&self.rooms);
        let handle = RoomHandle::spawn(
            room_id.to_string(),
            &self.config,
            initial_root,
            Arc::clone(&self.durability),
            registry,
        );

        use dashmap::mapref::entry::Entry;
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(existing) => RoomHandle::from_sender(room_id.to_string(), existing.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(handle.sender());
                handle
            }
        }
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Flush every live room's durability hook ahead of process shutdown
    /// (SPEC_FULL §11). Rooms evict themselves from `self.rooms` once their
    /// last handle is dropped and their mailbox closes.
    pub async fn shutdown_all(&self) {
        let handles: Vec<RoomHandle> = self
            .rooms
            .iter()
            .map(|entry| RoomHandle::from_sender(entry.key().clone(), entry.value().clone()))
            .collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::noop::NoOpDurability;

    fn config() -> RoomConfig {
        RoomConfig {
            history_cap: 100,
            cursor_throttle_ms: 50,
            flush_debounce_ms: 50,
        }
    }

    #[tokio::test]
    async fn reuses_the_same_room_for_repeat_lookups() {
        let manager = SessionManager::new(config(), Arc::new(NoOpDurability));
        let a = manager.get_or_create_room("room-1").await;
        let b = manager.get_or_create_room("room-1").await;
        assert_eq!(a.id(), b.id());
        assert_eq!(manager.room_count(), 1);
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_rooms() {
        let manager = SessionManager::new(config(), Arc::new(NoOpDurability));
        manager.get_or_create_room("room-1").await;
        manager.get_or_create_room("room-2").await;
        assert_eq!(manager.room_count(), 2);
    }
}
