//! Redb-backed durability hook: persists one serialized CRDT snapshot per
//! room (spec §6 "Snapshot persistence format"). Grounded on
//! `history/redb.rs`'s table-per-concern layout and write-txn discipline.

use super::{DurabilityError, DurabilityHook};
use async_trait::async_trait;
use collab_crdt::{Node, Op};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("room_snapshots");

pub struct RedbDurability {
    db: Arc<Database>,
}

impl RedbDurability {
    pub fn new(path: &str) -> Result<Self, DurabilityError> {
        let db = Database::create(path).map_err(|e| DurabilityError::Io(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl DurabilityHook for RedbDurability {
    async fn initial_storage(&self, room_id: &str) -> Option<Node> {
        let read_txn = self.db.begin_read().ok()?;
        let table = read_txn.open_table(SNAPSHOT_TABLE).ok()?;
        let bytes = table.get(room_id).ok()??;
        // A version mismatch or corrupt snapshot yields None (spec §6): the
        // room starts fresh rather than failing to construct.
        match serde_json::from_slice(bytes.value()) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "failed to decode stored snapshot, starting fresh");
                None
            }
        }
    }

    async fn on_ops_change(&self, room_id: &str, ops: &[Op]) {
        tracing::debug!(room_id, op_count = ops.len(), "ops applied, awaiting next flush tick");
    }

    async fn save_snapshot(&self, room_id: &str, root: &Node) -> Result<(), DurabilityError> {
        let bytes =
            serde_json::to_vec(root).map_err(|e| DurabilityError::Serialization(e.to_string()))?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| DurabilityError::Io(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(|e| DurabilityError::Io(e.to_string()))?;
            table
                .insert(room_id, bytes.as_slice())
                .map_err(|e| DurabilityError::Io(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| DurabilityError::Io(e.to_string()))?;
        Ok(())
    }

    async fn on_join(&self, room_id: &str, user_id: &str) {
        tracing::info!(room_id, user_id, "connection joined");
    }

    async fn on_leave(&self, room_id: &str, user_id: &str) {
        tracing::info!(room_id, user_id, "connection left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_crdt::{Clock, Entry, Value};

    #[tokio::test]
    async fn round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.redb");
        let hook = RedbDurability::new(path.to_str().unwrap()).unwrap();

        let mut root = Node::new_record();
        root.entries_mut()
            .insert("title".into(), Entry::live(Value::from("sprint board"), Clock(1)));

        hook.save_snapshot("room-1", &root).await.unwrap();
        let loaded = hook.initial_storage("room-1").await.unwrap();
        assert_eq!(
            loaded.entries().get("title").unwrap().value,
            Value::from("sprint board")
        );
    }

    #[tokio::test]
    async fn missing_room_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.redb");
        let hook = RedbDurability::new(path.to_str().unwrap()).unwrap();
        assert!(hook.initial_storage("nope").await.is_none());
    }
}
