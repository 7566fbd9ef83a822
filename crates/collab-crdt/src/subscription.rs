//! Path-scoped change subscriptions with batch-coalesced notification
//! (spec §4.3 "Subscriptions", §5).

use std::collections::{HashMap, HashSet};

pub type SubscriptionId = u64;
type Path = Vec<String>;
type Callback = Box<dyn Fn() + Send + Sync>;

struct Subscription {
    path: Path,
    /// `false`: fire only when the changed path equals this subscription's
    /// path exactly. `true`: also fire for any change at or below this
    /// path (the subscription path is a prefix of the changed path).
    deep: bool,
    callback: Callback,
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    path.len() >= prefix.len() && prefix == &path[..prefix.len()]
}

/// Tracks active subscriptions and, during a batch, which of them have
/// already been queued for notification — so ten field changes under one
/// deep subscription coalesce into a single callback invocation (spec §4.3
/// "Notifications are coalesced").
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: SubscriptionId,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    pending: HashSet<SubscriptionId>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` against `path`, firing once per batch it
    /// matches (spec §4.3).
    pub fn subscribe(
        &mut self,
        path: Path,
        deep: bool,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                path,
                deep,
                callback: Box::new(callback),
            },
        );
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
        self.pending.remove(&id);
    }

    /// Record that `changed_path` was touched by an applied op. Matching
    /// subscriptions are queued but not yet notified — call
    /// `notify_pending` once the whole batch of ops has been applied.
    pub fn record_change(&mut self, changed_path: &[String]) {
        for (id, sub) in &self.subscriptions {
            let matches = if sub.deep {
                is_prefix(&sub.path, changed_path) || is_prefix(changed_path, &sub.path)
            } else {
                sub.path == changed_path
            };
            if matches {
                self.pending.insert(*id);
            }
        }
    }

    /// Invoke the callback of every subscription queued since the last
    /// drain, deduplicated, and return their ids.
    pub fn notify_pending(&mut self) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self.pending.drain().collect();
        ids.sort_unstable();
        for id in &ids {
            if let Some(sub) = self.subscriptions.get(id) {
                (sub.callback)();
            }
        }
        ids
    }

    #[must_use]
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn p(segments: &[&str]) -> Path {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        (count, move || {
            callback_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn shallow_fires_only_on_exact_path() {
        let mut reg = SubscriptionRegistry::new();
        let (count, cb) = counter();
        let id = reg.subscribe(p(&["room", "board"]), false, cb);
        reg.record_change(&p(&["room", "board", "card1"]));
        assert!(reg.notify_pending().is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        reg.record_change(&p(&["room", "board"]));
        assert_eq!(reg.notify_pending(), vec![id]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deep_fires_on_descendant_change() {
        let mut reg = SubscriptionRegistry::new();
        let (count, cb) = counter();
        let id = reg.subscribe(p(&["room", "board"]), true, cb);
        reg.record_change(&p(&["room", "board", "card1", "title"]));
        assert_eq!(reg.notify_pending(), vec![id]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_coalesces_repeated_matches_into_one_callback() {
        let mut reg = SubscriptionRegistry::new();
        let (count, cb) = counter();
        let id = reg.subscribe(p(&["room", "board"]), true, cb);
        for _ in 0..10 {
            reg.record_change(&p(&["room", "board", "card1"]));
        }
        let drained = reg.notify_pending();
        assert_eq!(drained, vec![id]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(reg.notify_pending().is_empty());
    }

    #[test]
    fn unsubscribe_stops_future_matches() {
        let mut reg = SubscriptionRegistry::new();
        let (count, cb) = counter();
        let id = reg.subscribe(p(&["x"]), false, cb);
        reg.unsubscribe(id);
        reg.record_change(&p(&["x"]));
        assert!(reg.notify_pending().is_empty());
        assert!(!reg.is_subscribed(id));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
