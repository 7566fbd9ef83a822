//! Undo/redo history with batching and a pause guard (spec §4.4).
//!
//! No direct teacher analogue; the shape (a capped stack of entries, a
//! pause flag the caller sets while replaying its own inverses) follows the
//! params-struct and mailbox-guard texture used throughout the actor layer.

use crate::ops::Op;
use std::collections::HashMap;

pub type SubscriptionId = u64;
type Callback = Box<dyn Fn() + Send + Sync>;

/// One undoable unit: the ops that were applied, and their inverses in the
/// order needed to undo them (last-applied first).
#[derive(Debug, Clone, Default)]
struct HistoryEntry {
    forward: Vec<Op>,
    inverse: Vec<Op>,
}

impl HistoryEntry {
    fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Per-room undo/redo stack. A room actor records every locally-sourced op
/// (and its computed inverse) here; remote ops replayed from other peers
/// are never recorded, since undo is a purely local, per-author notion
/// (spec §4.4).
pub struct HistoryManager {
    cap: usize,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    batch: Option<HistoryEntry>,
    paused: bool,
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Callback>,
}

impl HistoryManager {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            batch: None,
            paused: false,
            next_id: 0,
            subscribers: HashMap::new(),
        }
    }

    /// Record one applied op and its inverse. A no-op while paused, while
    /// `inverse` is `None` (deleting an already-missing field leaves nothing
    /// to undo), or for an op outside any room's own authorship (the caller
    /// decides what's local). Fires subscribers immediately unless a batch
    /// is in progress, in which case `end_batch` fires them instead (spec
    /// §4.4 "Notifications fire on record (non-batched), end_batch, undo,
    /// redo, and clear").
    pub fn record(&mut self, forward: Op, inverse: Option<Op>) {
        if self.paused {
            return;
        }
        let Some(inverse) = inverse else {
            return;
        };

        if let Some(batch) = &mut self.batch {
            batch.forward.push(forward);
            batch.inverse.insert(0, inverse);
            return;
        }

        if self.push_entry(HistoryEntry {
            forward: vec![forward],
            inverse: vec![inverse],
        }) {
            self.notify();
        }
    }

    /// Pushes a non-empty entry onto the undo stack, evicting the oldest
    /// once `cap` is exceeded. Returns whether anything was actually pushed.
    fn push_entry(&mut self, entry: HistoryEntry) -> bool {
        if entry.is_empty() {
            return false;
        }
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.cap {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        true
    }

    /// Begin accumulating subsequent `record` calls into one undoable unit.
    /// Nested calls are flattened into the same batch.
    pub fn start_batch(&mut self) {
        if self.batch.is_none() {
            self.batch = Some(HistoryEntry::default());
        }
    }

    pub fn end_batch(&mut self) {
        if let Some(entry) = self.batch.take() {
            if self.push_entry(entry) {
                self.notify();
            }
        }
    }

    /// Pop the most recent entry and return its inverse ops, to be
    /// re-stamped with a fresh clock and re-applied by the caller.
    pub fn undo(&mut self) -> Option<Vec<Op>> {
        let entry = self.undo_stack.pop()?;
        let ops = entry.inverse.clone();
        self.redo_stack.push(entry);
        self.notify();
        Some(ops)
    }

    /// Pop the most recently undone entry and return its forward ops.
    pub fn redo(&mut self) -> Option<Vec<Op>> {
        let entry = self.redo_stack.pop()?;
        let ops = entry.forward.clone();
        self.undo_stack.push(entry);
        self.notify();
        Some(ops)
    }

    /// Suppress `record` — set while the room re-applies its own undo/redo
    /// ops, so undoing doesn't itself get recorded as undoable.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
        self.notify();
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Register `callback` to run on every `record` (non-batched),
    /// `end_batch`, `undo`, `redo`, and `clear` (spec §4.4) — the room
    /// actor uses this to push `can_undo`/`can_redo` transitions out to
    /// clients instead of polling.
    pub fn subscribe(&mut self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, Box::new(callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.remove(&id);
    }

    fn notify(&self) {
        for callback in self.subscribers.values() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    fn del(key: &str, clock: u64) -> Op {
        Op::Delete {
            path: vec![],
            key: key.to_string(),
            clock: Clock(clock),
        }
    }

    #[test]
    fn record_then_undo_returns_inverse() {
        let mut h = HistoryManager::new(10);
        h.record(del("a", 1), Some(del("a", 0)));
        assert!(h.can_undo());
        let ops = h.undo().unwrap();
        assert_eq!(ops, vec![del("a", 0)]);
        assert!(!h.can_undo());
        assert!(h.can_redo());
    }

    #[test]
    fn redo_replays_forward_ops() {
        let mut h = HistoryManager::new(10);
        h.record(del("a", 1), Some(del("a", 0)));
        h.undo();
        let ops = h.redo().unwrap();
        assert_eq!(ops, vec![del("a", 1)]);
        assert!(h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn new_record_after_undo_clears_redo_stack() {
        let mut h = HistoryManager::new(10);
        h.record(del("a", 1), Some(del("a", 0)));
        h.undo();
        assert!(h.can_redo());
        h.record(del("b", 2), Some(del("b", 0)));
        assert!(!h.can_redo());
    }

    #[test]
    fn batch_groups_ops_into_one_entry_with_lifo_inverse() {
        let mut h = HistoryManager::new(10);
        h.start_batch();
        h.record(del("a", 1), Some(del("a", 0)));
        h.record(del("b", 2), Some(del("b", 0)));
        h.end_batch();

        assert_eq!(h.undo_stack.len(), 1);
        let ops = h.undo().unwrap();
        // inverse of the later op (b) must come first to unwind correctly.
        assert_eq!(ops, vec![del("b", 0), del("a", 0)]);
    }

    #[test]
    fn pause_suppresses_recording() {
        let mut h = HistoryManager::new(10);
        h.pause();
        h.record(del("a", 1), Some(del("a", 0)));
        assert!(!h.can_undo());
        h.resume();
        h.record(del("b", 1), Some(del("b", 0)));
        assert!(h.can_undo());
    }

    #[test]
    fn cap_evicts_oldest_entry() {
        let mut h = HistoryManager::new(2);
        h.record(del("a", 1), Some(del("a", 0)));
        h.record(del("b", 1), Some(del("b", 0)));
        h.record(del("c", 1), Some(del("c", 0)));
        assert_eq!(h.undo_stack.len(), 2);
        let ops = h.undo().unwrap();
        assert_eq!(ops, vec![del("c", 0)]);
        let ops = h.undo().unwrap();
        assert_eq!(ops, vec![del("b", 0)]);
        assert!(!h.can_undo());
    }

    #[test]
    fn missing_inverse_records_nothing() {
        let mut h = HistoryManager::new(10);
        h.record(del("a", 1), None);
        assert!(!h.can_undo());
    }

    #[test]
    fn subscriber_fires_on_record_undo_redo_and_clear() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut h = HistoryManager::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        h.subscribe(move || {
            callback_count.fetch_add(1, Ordering::SeqCst);
        });

        h.record(del("a", 1), Some(del("a", 0)));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        h.undo();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        h.redo();
        assert_eq!(count.load(Ordering::SeqCst), 3);

        h.clear();
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn subscriber_fires_once_per_batch_not_per_record() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut h = HistoryManager::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        h.subscribe(move || {
            callback_count.fetch_add(1, Ordering::SeqCst);
        });

        h.start_batch();
        h.record(del("a", 1), Some(del("a", 0)));
        h.record(del("b", 2), Some(del("b", 0)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        h.end_batch();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut h = HistoryManager::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        let id = h.subscribe(move || {
            callback_count.fetch_add(1, Ordering::SeqCst);
        });
        h.unsubscribe(id);
        h.record(del("a", 1), Some(del("a", 0)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
