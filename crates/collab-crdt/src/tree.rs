//! The CRDT value tree: path resolution, op application, and inverse-op
//! computation (spec §4.3).

use crate::error::DropReason;
use crate::node::{Entry, Node, NodeKind};
use crate::ops::Op;
use crate::subscription::{SubscriptionId, SubscriptionRegistry};
use crate::value::Value;

/// Outcome of applying a single op to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The op was applied. `inverse` is `None` only for the "delete on a
    /// field that was already missing" case (spec §4.3: no inverse).
    Applied { inverse: Option<Op> },
    /// The op was dropped; see `DropReason` for why. Per spec §4.3/§7 this
    /// is never an error the caller should propagate — log and move on.
    Dropped(DropReason),
}

/// The root-owned CRDT tree for one room.
pub struct CrdtTree {
    root: Node,
    subscriptions: SubscriptionRegistry,
}

impl Default for CrdtTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CrdtTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::new_record(),
            subscriptions: SubscriptionRegistry::new(),
        }
    }

    #[must_use]
    pub fn from_root(root: Node) -> Self {
        Self {
            root,
            subscriptions: SubscriptionRegistry::new(),
        }
    }

    /// Register a callback on the node at `path` (spec §4.3 "Subscriptions").
    /// Shallow (`deep=false`) fires only when that node's direct entries
    /// change; deep also fires for any descendant change. Coalesced per
    /// batch — call [`Self::notify_subscribers`] once after applying a
    /// batch of ops to fire each matching subscription exactly once.
    pub fn subscribe(
        &mut self,
        path: Vec<String>,
        deep: bool,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscriptions.subscribe(path, deep, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    /// Fire every subscription queued by applied ops since the last call,
    /// deduplicated, and return their ids. Callers apply a whole batch of
    /// ops via [`Self::apply`] and then call this once, so a burst of
    /// changes under one deep subscription produces a single notification
    /// (spec §4.3 "Notifications are coalesced").
    pub fn notify_subscribers(&mut self) -> Vec<SubscriptionId> {
        self.subscriptions.notify_pending()
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Replace the whole tree (used to seed a room, spec §3 "Lifecycle").
    pub fn seed(&mut self, root: Node) {
        self.root = root;
    }

    fn resolve_mut(&mut self, path: &[String]) -> Result<&mut Node, DropReason> {
        let mut current = &mut self.root;
        for segment in path {
            let entry = current
                .entries_mut()
                .get_mut(segment)
                .ok_or(DropReason::PathNotFound)?;
            if entry.tombstone {
                return Err(DropReason::Tombstoned);
            }
            current = entry
                .value
                .as_node_mut()
                .ok_or(DropReason::SchemaViolation)?;
        }
        Ok(current)
    }

    /// Apply one op. Never panics on malformed input — unresolvable paths,
    /// schema mismatches and stale clocks all come back as `Dropped`. A
    /// successful apply queues `op`'s path for the next
    /// [`Self::notify_subscribers`] call (spec §4.3 "Subscriptions").
    pub fn apply(&mut self, op: &Op) -> ApplyOutcome {
        let outcome = match op {
            Op::Set {
                path,
                key,
                value,
                clock,
            } => self.apply_set(path, key, value.clone(), *clock),
            Op::Delete { path, key, clock } => self.apply_delete(path, key, *clock),
            Op::ListInsert {
                path,
                position,
                value,
                clock,
            } => self.apply_list_insert(path, position, value.clone(), *clock),
            Op::ListDelete {
                path,
                position,
                clock,
            } => self.apply_list_delete(path, position, *clock),
            Op::ListMove {
                path,
                from_position,
                to_position,
                clock,
            } => self.apply_list_move(path, from_position, to_position, *clock),
        };
        if matches!(outcome, ApplyOutcome::Applied { .. }) {
            self.subscriptions.record_change(op.path());
        }
        outcome
    }

    fn apply_set(
        &mut self,
        path: &[String],
        key: &str,
        value: Value,
        clock: crate::clock::Clock,
    ) -> ApplyOutcome {
        let node = match self.resolve_mut(path) {
            Ok(n) => n,
            Err(reason) => return ApplyOutcome::Dropped(reason),
        };
        if node.kind() == NodeKind::List {
            return ApplyOutcome::Dropped(DropReason::SchemaViolation);
        }

        match node.entries_mut().get_mut(key) {
            Some(existing) => {
                if clock <= existing.clock {
                    return ApplyOutcome::Dropped(DropReason::StaleOp);
                }
                let inverse = Op::Set {
                    path: path.to_vec(),
                    key: key.to_string(),
                    value: existing.value.clone(),
                    clock: existing.clock,
                };
                existing.value = value;
                existing.clock = clock;
                existing.tombstone = false;
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
            None => {
                node.entries_mut()
                    .insert(key.to_string(), Entry::live(value, clock));
                let inverse = Op::Delete {
                    path: path.to_vec(),
                    key: key.to_string(),
                    clock: crate::clock::Clock::ZERO,
                };
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
        }
    }

    fn apply_delete(
        &mut self,
        path: &[String],
        key: &str,
        clock: crate::clock::Clock,
    ) -> ApplyOutcome {
        let node = match self.resolve_mut(path) {
            Ok(n) => n,
            Err(reason) => return ApplyOutcome::Dropped(reason),
        };
        if node.kind() == NodeKind::List {
            return ApplyOutcome::Dropped(DropReason::SchemaViolation);
        }

        match node.entries_mut().get_mut(key) {
            Some(existing) => {
                if clock <= existing.clock {
                    return ApplyOutcome::Dropped(DropReason::StaleOp);
                }
                let inverse = Op::Set {
                    path: path.to_vec(),
                    key: key.to_string(),
                    value: existing.value.clone(),
                    clock: existing.clock,
                };
                existing.clock = clock;
                existing.tombstone = true;
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
            None => ApplyOutcome::Applied { inverse: None },
        }
    }

    fn apply_list_insert(
        &mut self,
        path: &[String],
        position: &str,
        value: Value,
        clock: crate::clock::Clock,
    ) -> ApplyOutcome {
        let node = match self.resolve_mut(path) {
            Ok(n) => n,
            Err(reason) => return ApplyOutcome::Dropped(reason),
        };
        if node.kind() != NodeKind::List {
            return ApplyOutcome::Dropped(DropReason::SchemaViolation);
        }

        match node.entries_mut().get_mut(position) {
            Some(existing) => {
                if clock <= existing.clock {
                    return ApplyOutcome::Dropped(DropReason::StaleOp);
                }
                let inverse = Op::ListDelete {
                    path: path.to_vec(),
                    position: position.to_string(),
                    clock: crate::clock::Clock::ZERO,
                };
                existing.value = value;
                existing.clock = clock;
                existing.tombstone = false;
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
            None => {
                node.entries_mut()
                    .insert(position.to_string(), Entry::live(value, clock));
                let inverse = Op::ListDelete {
                    path: path.to_vec(),
                    position: position.to_string(),
                    clock: crate::clock::Clock::ZERO,
                };
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
        }
    }

    fn apply_list_delete(
        &mut self,
        path: &[String],
        position: &str,
        clock: crate::clock::Clock,
    ) -> ApplyOutcome {
        let node = match self.resolve_mut(path) {
            Ok(n) => n,
            Err(reason) => return ApplyOutcome::Dropped(reason),
        };
        if node.kind() != NodeKind::List {
            return ApplyOutcome::Dropped(DropReason::SchemaViolation);
        }

        match node.entries_mut().get_mut(position) {
            Some(existing) => {
                if clock <= existing.clock {
                    return ApplyOutcome::Dropped(DropReason::StaleOp);
                }
                let inverse = Op::ListInsert {
                    path: path.to_vec(),
                    position: position.to_string(),
                    value: existing.value.clone(),
                    clock: existing.clock,
                };
                existing.clock = clock;
                existing.tombstone = true;
                ApplyOutcome::Applied {
                    inverse: Some(inverse),
                }
            }
            None => ApplyOutcome::Applied { inverse: None },
        }
    }

    fn apply_list_move(
        &mut self,
        path: &[String],
        from_position: &str,
        to_position: &str,
        clock: crate::clock::Clock,
    ) -> ApplyOutcome {
        let node = match self.resolve_mut(path) {
            Ok(n) => n,
            Err(reason) => return ApplyOutcome::Dropped(reason),
        };
        if node.kind() != NodeKind::List {
            return ApplyOutcome::Dropped(DropReason::SchemaViolation);
        }

        // Design decision (spec §9 Open Questions): a move whose source is
        // missing or tombstoned is dropped entirely, leaving both
        // positions unchanged.
        let value = match node.entries().get(from_position) {
            Some(entry) if !entry.tombstone => entry.value.clone(),
            _ => return ApplyOutcome::Dropped(DropReason::Tombstoned),
        };

        if let Some(to_entry) = node.entries().get(to_position) {
            if clock <= to_entry.clock {
                return ApplyOutcome::Dropped(DropReason::StaleOp);
            }
        }
        let from_clock = node.entries()[from_position].clock;
        if clock <= from_clock {
            return ApplyOutcome::Dropped(DropReason::StaleOp);
        }

        let entries = node.entries_mut();
        if let Some(from_entry) = entries.get_mut(from_position) {
            from_entry.clock = clock;
            from_entry.tombstone = true;
        }
        entries.insert(to_position.to_string(), Entry::live(value, clock));

        ApplyOutcome::Applied {
            inverse: Some(Op::ListMove {
                path: path.to_vec(),
                from_position: to_position.to_string(),
                to_position: from_position.to_string(),
                clock: crate::clock::Clock::ZERO,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    fn set(path: &[&str], key: &str, value: Value, clock: u64) -> Op {
        Op::Set {
            path: path.iter().map(|s| s.to_string()).collect(),
            key: key.to_string(),
            value,
            clock: Clock(clock),
        }
    }

    #[test]
    fn set_on_missing_field_creates_it() {
        let mut tree = CrdtTree::new();
        let outcome = tree.apply(&set(&[], "counter", Value::Number(5.0), 1));
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
        assert_eq!(
            tree.root().entries().get("counter").unwrap().value,
            Value::Number(5.0)
        );
    }

    #[test]
    fn stale_set_is_dropped() {
        let mut tree = CrdtTree::new();
        tree.apply(&set(&[], "counter", Value::Number(5.0), 5));
        let outcome = tree.apply(&set(&[], "counter", Value::Number(7.0), 3));
        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::StaleOp));
        assert_eq!(
            tree.root().entries().get("counter").unwrap().value,
            Value::Number(5.0)
        );
    }

    #[test]
    fn idempotent_reapplication_is_a_noop() {
        let mut tree = CrdtTree::new();
        let op = set(&[], "counter", Value::Number(5.0), 1);
        tree.apply(&op);
        let before = tree.root().clone();
        let outcome = tree.apply(&op);
        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::StaleOp));
        assert_eq!(tree.root(), &before);
    }

    #[test]
    fn tombstone_then_stale_set_then_revive() {
        // S10: set clock=1, delete clock=2 -> tombstoned; set clock=0 (stale,
        // rejected); set clock=3 -> revives.
        let mut tree = CrdtTree::new();
        tree.apply(&set(&[], "x", Value::Number(1.0), 1));
        let del = Op::Delete {
            path: vec![],
            key: "x".to_string(),
            clock: Clock(2),
        };
        tree.apply(&del);
        assert!(tree.root().entries().get("x").unwrap().tombstone);

        let stale = set(&[], "x", Value::Number(9.0), 1);
        assert_eq!(tree.apply(&stale), ApplyOutcome::Dropped(DropReason::StaleOp));
        assert!(tree.root().entries().get("x").unwrap().tombstone);

        let revive = set(&[], "x", Value::Number(2.0), 3);
        tree.apply(&revive);
        let entry = tree.root().entries().get("x").unwrap();
        assert!(!entry.tombstone);
        assert_eq!(entry.value, Value::Number(2.0));
    }

    #[test]
    fn path_through_tombstone_is_dropped() {
        let mut tree = CrdtTree::new();
        tree.apply(&set(&[], "child", Value::Node(Node::new_record()), 1));
        tree.apply(&Op::Delete {
            path: vec![],
            key: "child".to_string(),
            clock: Clock(2),
        });
        let outcome = tree.apply(&set(&["child"], "leaf", Value::Number(1.0), 3));
        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::Tombstoned));
    }

    #[test]
    fn list_insert_then_delete_then_stale_insert_is_dropped() {
        let mut tree = CrdtTree::new();
        tree.apply(&set(&[], "items", Value::Node(Node::new_list()), 1));
        tree.apply(&Op::ListInsert {
            path: vec!["items".to_string()],
            position: "a0".to_string(),
            value: Value::from("x"),
            clock: Clock(2),
        });
        tree.apply(&Op::ListDelete {
            path: vec!["items".to_string()],
            position: "a0".to_string(),
            clock: Clock(99),
        });
        let outcome = tree.apply(&Op::ListInsert {
            path: vec!["items".to_string()],
            position: "a0".to_string(),
            value: Value::from("z"),
            clock: Clock(50),
        });
        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::StaleOp));
    }

    #[test]
    fn convergence_under_reordering() {
        // Two ops with distinct LWW clocks, applied in either order,
        // converge to the same state (spec §8 property 1).
        let op_a = set(&[], "counter", Value::Number(5.0), 1);
        let op_b = set(&[], "counter", Value::Number(7.0), 2);

        let mut forward = CrdtTree::new();
        forward.apply(&op_a);
        forward.apply(&op_b);

        let mut reversed = CrdtTree::new();
        reversed.apply(&op_b);
        reversed.apply(&op_a);

        assert_eq!(
            serde_json::to_value(forward.root()).unwrap(),
            serde_json::to_value(reversed.root()).unwrap()
        );
    }

    #[test]
    fn list_move_from_tombstoned_source_is_dropped() {
        let mut tree = CrdtTree::new();
        tree.apply(&set(&[], "items", Value::Node(Node::new_list()), 1));
        tree.apply(&Op::ListInsert {
            path: vec!["items".to_string()],
            position: "a0".to_string(),
            value: Value::from("x"),
            clock: Clock(2),
        });
        tree.apply(&Op::ListDelete {
            path: vec!["items".to_string()],
            position: "a0".to_string(),
            clock: Clock(3),
        });
        let outcome = tree.apply(&Op::ListMove {
            path: vec!["items".to_string()],
            from_position: "a0".to_string(),
            to_position: "a1".to_string(),
            clock: Clock(4),
        });
        assert_eq!(outcome, ApplyOutcome::Dropped(DropReason::Tombstoned));
        assert!(tree.root().entries().get("items").unwrap().value.as_node().unwrap().entries().get("a1").is_none());
    }
}
