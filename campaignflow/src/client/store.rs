//! Frame-throttled store of partial fields per stage.

use crate::core::AgentTokenPayload;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::trace;

/// The latest partial fields of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    /// Extracted fields.
    pub fields: Map<String, Value>,
    /// Number of extracted fields.
    pub field_count: usize,
    /// Tokens received when the snapshot was taken.
    pub token_count: usize,
    /// Whether this was the stage's last snapshot.
    pub is_final: bool,
}

impl From<AgentTokenPayload> for FieldSnapshot {
    fn from(payload: AgentTokenPayload) -> Self {
        Self {
            fields: payload.fields,
            field_count: payload.field_count,
            token_count: payload.token_count,
            is_final: payload.is_final,
        }
    }
}

/// Delivered to observers: the stages whose snapshot changed since the last
/// notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNotification {
    /// Changed stage names.
    pub stages: BTreeSet<String>,
}

/// Identifies an observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&FieldNotification) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    snapshots: HashMap<String, FieldSnapshot>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_id: u64,
    dirty: BTreeSet<String>,
    flush_scheduled: bool,
    // Bumped by every flush; a timer armed under an older value is stale.
    generation: u64,
    // Bumped by every clear; writes tagged with an older value are dropped.
    epoch: u64,
}

struct Inner {
    state: Mutex<StoreState>,
    frame_budget: Duration,
}

/// Latest partial field set per stage, with coalesced notifications.
///
/// Writes are last-writer-wins per stage. However many updates arrive
/// within one frame budget, observers get a single notification naming
/// every changed stage. Clones share state; separate `new` calls give
/// isolated stores.
#[derive(Clone)]
pub struct FieldStore {
    inner: Arc<Inner>,
}

impl FieldStore {
    /// Creates a store that notifies at most once per `frame_budget`.
    #[must_use]
    pub fn new(frame_budget: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                frame_budget,
            }),
        }
    }

    /// Returns the frame budget.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        self.inner.frame_budget
    }

    /// Replaces a stage's snapshot.
    pub fn update(&self, stage: impl Into<String>, snapshot: FieldSnapshot) {
        self.write(None, stage.into(), Some(snapshot));
    }

    /// Drops a stage's snapshot, e.g. when the stage restarts.
    pub fn reset(&self, stage: &str) {
        self.write(None, stage.to_string(), None);
    }

    /// Returns the current epoch. Every [`clear`](Self::clear) starts a new one.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.state.lock().epoch
    }

    /// Like [`update`](Self::update), but ignored once the store was cleared
    /// after `epoch` was read. Returns false if the write was dropped.
    pub fn update_in(&self, epoch: u64, stage: impl Into<String>, snapshot: FieldSnapshot) -> bool {
        self.write(Some(epoch), stage.into(), Some(snapshot))
    }

    /// Like [`reset`](Self::reset), but ignored once the store was cleared
    /// after `epoch` was read. Returns false if the write was dropped.
    pub fn reset_in(&self, epoch: u64, stage: &str) -> bool {
        self.write(Some(epoch), stage.to_string(), None)
    }

    fn write(&self, epoch: Option<u64>, stage: String, snapshot: Option<FieldSnapshot>) -> bool {
        let schedule = {
            let mut state = self.inner.state.lock();
            if epoch.is_some_and(|epoch| epoch != state.epoch) {
                return false;
            }
            let changed = match snapshot {
                Some(snapshot) => {
                    state.snapshots.insert(stage.clone(), snapshot);
                    true
                }
                None => state.snapshots.remove(&stage).is_some(),
            };
            if !changed {
                return true;
            }
            state.dirty.insert(stage);
            (!std::mem::replace(&mut state.flush_scheduled, true)).then_some(state.generation)
        };
        if let Some(generation) = schedule {
            self.schedule_flush(generation);
        }
        true
    }

    /// Returns a stage's snapshot.
    #[must_use]
    pub fn snapshot(&self, stage: &str) -> Option<FieldSnapshot> {
        self.inner.state.lock().snapshots.get(stage).cloned()
    }

    /// Returns one field of a stage's snapshot.
    #[must_use]
    pub fn field(&self, stage: &str, field: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .snapshots
            .get(stage)
            .and_then(|s| s.fields.get(field).cloned())
    }

    /// Returns every stage with a snapshot.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = self.inner.state.lock().snapshots.keys().cloned().collect();
        stages.sort();
        stages
    }

    /// Registers an observer.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&FieldNotification) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.observers.push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.observers.len();
        state.observers.retain(|(existing, _)| *existing != id);
        state.observers.len() != before
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    /// Notifies observers of pending changes right away.
    ///
    /// Returns false if nothing changed since the last notification.
    pub fn flush(&self) -> bool {
        self.flush_generation(None)
    }

    fn flush_generation(&self, armed: Option<u64>) -> bool {
        let (notification, observers) = {
            let mut state = self.inner.state.lock();
            if armed.is_some_and(|generation| generation != state.generation) {
                return false;
            }
            state.generation += 1;
            state.flush_scheduled = false;
            if state.dirty.is_empty() {
                return false;
            }
            let stages = std::mem::take(&mut state.dirty);
            let observers: Vec<Observer> = state.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
            (FieldNotification { stages }, observers)
        };

        trace!(stages = notification.stages.len(), observers = observers.len(), "Field store flush");
        for observer in observers {
            observer(&notification);
        }
        true
    }

    /// Drops every snapshot and pending change. Observers stay registered.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.snapshots.clear();
        state.dirty.clear();
        state.epoch += 1;
    }

    fn schedule_flush(&self, generation: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.flush_generation(Some(generation));
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let budget = self.inner.frame_budget;
        runtime.spawn(async move {
            tokio::time::sleep(budget).await;
            if let Some(inner) = weak.upgrade() {
                FieldStore { inner }.flush_generation(Some(generation));
            }
        });
    }
}

impl Default for FieldStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl std::fmt::Debug for FieldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FieldStore")
            .field("stages", &state.snapshots.len())
            .field("observers", &state.observers.len())
            .field("frame_budget", &self.inner.frame_budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(name: &str, tokens: usize) -> FieldSnapshot {
        let mut fields = Map::new();
        fields.insert("companyName".to_string(), json!(name));
        FieldSnapshot {
            fields,
            field_count: 1,
            token_count: tokens,
            is_final: false,
        }
    }

    fn recording(store: &FieldStore) -> Arc<Mutex<Vec<FieldNotification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |n| sink.lock().push(n.clone()));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_within_a_frame_coalesce() {
        let store = FieldStore::new(Duration::from_millis(16));
        let seen = recording(&store);

        for n in 0..10 {
            store.update("profile", snapshot("Ac", n));
        }
        store.update("brainstorm", snapshot("x", 1));
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].stages,
            BTreeSet::from(["brainstorm".to_string(), "profile".to_string()])
        );
        assert_eq!(store.snapshot("profile").unwrap().token_count, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_notification_per_frame() {
        let store = FieldStore::new(Duration::from_millis(16));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // 100 updates spread over 100ms.
        for n in 0..100 {
            store.update("profile", snapshot("Acme", n));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let notifications = count.load(Ordering::SeqCst);
        assert!(notifications >= 5, "got {notifications}");
        assert!(notifications <= 7, "got {notifications}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_disarms_pending_timer() {
        let store = FieldStore::new(Duration::from_millis(16));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // t=0: arms a timer for t=16, then flushes by hand.
        store.update("profile", snapshot("Ac", 1));
        assert!(store.flush());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // t=10: arms a fresh timer for t=26.
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.update("profile", snapshot("Acme", 2));

        // t=18: the first timer fired and must not have notified.
        tokio::time::sleep(Duration::from_millis(8)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_writes_from_before_clear_are_dropped() {
        let store = FieldStore::default();
        let epoch = store.epoch();
        assert!(store.update_in(epoch, "profile", snapshot("Acme", 1)));

        store.clear();
        assert!(!store.update_in(epoch, "profile", snapshot("Stale", 2)));
        assert!(!store.reset_in(epoch, "profile"));
        assert!(store.snapshot("profile").is_none());

        assert!(store.update_in(store.epoch(), "profile", snapshot("Globex", 1)));
        assert_eq!(store.field("profile", "companyName"), Some(json!("Globex")));
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = FieldStore::default();
        store.update("profile", snapshot("Ac", 1));
        store.update("profile", snapshot("Acme", 2));
        assert_eq!(store.field("profile", "companyName"), Some(json!("Acme")));
    }

    #[tokio::test]
    async fn test_flush_and_unsubscribe() {
        let store = FieldStore::new(Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.update("profile", snapshot("Acme", 1));
        assert!(store.flush());
        assert!(!store.flush());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update("profile", snapshot("Acme", 2));
        store.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_runtime_notifies_immediately() {
        let store = FieldStore::default();
        let seen = recording(&store);
        store.update("profile", snapshot("Acme", 1));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let a = FieldStore::default();
        let b = FieldStore::default();
        a.update("profile", snapshot("Acme", 1));
        assert!(b.snapshot("profile").is_none());

        a.reset("profile");
        a.clear();
        assert!(a.stages().is_empty());
    }
}
