//! Ephemeral per-connection state: presence, cursors, and the live-state
//! key-value store (spec §3, §4.5; online-status enum per SPEC_FULL §11).

use collab_crdt::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A connection's online status. Left unconstrained by spec.md's presence
/// shape; fixed here as a closed enum so presence replace-semantics are
/// well typed (SPEC_FULL §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Away,
    Idle,
}

impl Default for OnlineStatus {
    fn default() -> Self {
        Self::Online
    }
}

/// One connection's presence entry (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub online_status: OnlineStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A partial presence update, as sent over `presence:update` (spec §4.6).
/// `None` fields are left untouched by `update_presence`'s shallow merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialPresence {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub online_status: Option<OnlineStatus>,
    pub location: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Presence {
    /// Shallow-merge a partial update into this entry (spec §4.5
    /// `update_presence`).
    pub fn merge(&mut self, partial: PartialPresence) {
        if let Some(v) = partial.user_id {
            self.user_id = v;
        }
        if let Some(v) = partial.display_name {
            self.display_name = v;
        }
        if let Some(v) = partial.color {
            self.color = Some(v);
        }
        if let Some(v) = partial.online_status {
            self.online_status = v;
        }
        if let Some(v) = partial.location {
            self.location = Some(v);
        }
        if let Some(v) = partial.metadata {
            self.metadata = v;
        }
    }
}

/// Optional viewport the cursor is reported against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub origin_x: f64,
    pub origin_y: f64,
    pub scale: f64,
}

/// One connection's cursor entry (spec §4.5). Cursor updates replace the
/// whole entry — there is no partial-merge variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

/// One entry in the live-state key-value store (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStateEntry {
    pub value: Value,
    /// Caller-supplied monotone timestamp; last-writer-wins, equal
    /// timestamps accept (idempotence is the caller's responsibility).
    pub timestamp: f64,
    pub owner: String,
    pub last_writer: String,
}

impl LiveStateEntry {
    /// Shallow-merge semantics for `merge=true` (SPEC_FULL §11): union keys
    /// of two `Record`/`Map` values with the new value winning per key; any
    /// other value pairing replaces wholesale.
    #[must_use]
    pub fn merged_value(old: &Value, new: Value) -> Value {
        use collab_crdt::Node;
        let (Value::Node(old_node), Value::Node(new_node)) = (old, &new) else {
            return new;
        };
        if !matches!(old_node, Node::Record { .. } | Node::Map { .. })
            || !matches!(new_node, Node::Record { .. } | Node::Map { .. })
        {
            return new;
        }
        let mut merged = old_node.clone();
        for (key, entry) in new_node.entries() {
            merged.entries_mut().insert(key.clone(), entry.clone());
        }
        Value::Node(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_crdt::{Clock, Entry, Node};

    #[test]
    fn presence_merge_only_touches_present_fields() {
        let mut presence = Presence {
            user_id: "u1".into(),
            display_name: "Ada".into(),
            color: Some("red".into()),
            online_status: OnlineStatus::Online,
            location: None,
            metadata: HashMap::new(),
        };
        presence.merge(PartialPresence {
            online_status: Some(OnlineStatus::Away),
            ..Default::default()
        });
        assert_eq!(presence.display_name, "Ada");
        assert_eq!(presence.online_status, OnlineStatus::Away);
    }

    #[test]
    fn live_state_merge_unions_record_keys() {
        let mut old = Node::new_record();
        old.entries_mut()
            .insert("a".into(), Entry::live(Value::Number(1.0), Clock(1)));
        old.entries_mut()
            .insert("b".into(), Entry::live(Value::Number(2.0), Clock(1)));

        let mut new = Node::new_record();
        new.entries_mut()
            .insert("b".into(), Entry::live(Value::Number(9.0), Clock(2)));

        let merged =
            LiveStateEntry::merged_value(&Value::Node(old), Value::Node(new));
        let Value::Node(merged) = merged else {
            panic!("expected node");
        };
        assert_eq!(
            merged.entries().get("a").unwrap().value,
            Value::Number(1.0)
        );
        assert_eq!(
            merged.entries().get("b").unwrap().value,
            Value::Number(9.0)
        );
    }

    #[test]
    fn live_state_merge_replaces_non_object_values() {
        let merged = LiveStateEntry::merged_value(&Value::Number(1.0), Value::Number(2.0));
        assert_eq!(merged, Value::Number(2.0));
    }
}
