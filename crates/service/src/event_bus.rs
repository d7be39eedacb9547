//! In-process publish/subscribe for live dashboard updates
//!
//! Each live connection registers one subscriber, optionally scoped to an
//! organization. Broadcasts snapshot the matching callbacks and release the
//! registry lock before delivering, so subscribers may come and go while a
//! broadcast is in flight. Every callback runs inside its own failure
//! boundary; one bad subscriber never affects the others or the broadcaster.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use common::event::FleetEvent;

/// Error a subscriber callback may report; logged and otherwise ignored
#[derive(Debug, thiserror::Error)]
#[error("event delivery failed: {0}")]
pub struct DeliveryError(pub String);

pub type Callback = Arc<dyn Fn(&FleetEvent) -> Result<(), DeliveryError> + Send + Sync>;

struct Entry {
    token: u64,
    scope: Option<String>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    subscribers: RwLock<HashMap<String, Entry>>,
    next_token: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Registry>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `id`, replacing any existing registration
    /// with the same id
    ///
    /// A `None` scope means the subscriber has no organization context: it
    /// receives global broadcasts but never a scoped one.
    pub fn subscribe<F>(
        &self,
        id: impl Into<String>,
        scope: Option<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&FleetEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let id = id.into();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            token,
            scope: scope.clone(),
            callback: Arc::new(callback),
        };

        let replaced = self
            .inner
            .subscribers
            .write()
            .insert(id.clone(), entry)
            .is_some();
        tracing::debug!(subscriber = %id, scope = ?scope, replaced, "subscriber registered");

        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
            token,
            active: true,
        }
    }

    /// Remove the subscriber registered under `id`, whichever registration it is
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.inner.subscribers.write().remove(id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every subscriber; returns how many accepted it
    pub fn broadcast(&self, event: &FleetEvent) -> usize {
        let targets = self.snapshot(|_| true);
        deliver(targets, event)
    }

    /// Deliver `event` to subscribers whose scope is exactly `scope`
    pub fn broadcast_to_scope(&self, scope: &str, event: &FleetEvent) -> usize {
        let targets = self.snapshot(|entry| entry.scope.as_deref() == Some(scope));
        deliver(targets, event)
    }

    pub fn count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    pub fn clear(&self) {
        self.inner.subscribers.write().clear();
    }

    fn snapshot<P>(&self, predicate: P) -> Vec<(String, Callback)>
    where
        P: Fn(&Entry) -> bool,
    {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, entry)| (id.clone(), entry.callback.clone()))
            .collect()
    }
}

fn deliver(targets: Vec<(String, Callback)>, event: &FleetEvent) -> usize {
    let mut delivered = 0;
    for (id, callback) in targets {
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(e)) => {
                tracing::warn!(subscriber = %id, event = event.name(), "{}", e);
            }
            Err(_) => {
                tracing::warn!(subscriber = %id, event = event.name(), "subscriber panicked during delivery");
            }
        }
    }
    delivered
}

/// Handle returned by [`EventBus::subscribe`]
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the
/// registration it created. If the id has since been re-registered, the newer
/// registration is left alone.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    registry: Weak<Registry>,
    id: String,
    token: u64,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut subscribers = registry.subscribers.write();
        if subscribers.get(&self.id).map(|e| e.token) == Some(self.token) {
            subscribers.remove(&self.id);
            tracing::debug!(subscriber = %self.id, "subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn route_added(route_id: &str) -> FleetEvent {
        FleetEvent::RouteAdded {
            node_id: "node-1".into(),
            route_id: route_id.into(),
        }
    }

    fn recorder() -> (
        Arc<Mutex<Vec<FleetEvent>>>,
        impl Fn(&FleetEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |event: &FleetEvent| {
            sink.lock().push(event.clone());
            Ok(())
        })
    }

    #[test]
    fn test_scoped_broadcast_reaches_only_matching_scope() {
        let bus = EventBus::new();
        let (org1, cb1) = recorder();
        let (org2, cb2) = recorder();
        let (unscoped, cb3) = recorder();

        let _s1 = bus.subscribe("a", Some("org-1".into()), cb1);
        let _s2 = bus.subscribe("b", Some("org-2".into()), cb2);
        let _s3 = bus.subscribe("c", None, cb3);

        let delivered = bus.broadcast_to_scope("org-1", &route_added("r1"));
        assert_eq!(delivered, 1);
        assert_eq!(org1.lock().len(), 1);
        assert!(org2.lock().is_empty());
        assert!(unscoped.lock().is_empty());

        let delivered = bus.broadcast(&route_added("r2"));
        assert_eq!(delivered, 3);
        assert_eq!(unscoped.lock().len(), 1);
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let bus = EventBus::new();
        let (seen, cb) = recorder();

        let _bad = bus.subscribe("bad", Some("org-1".into()), |_: &FleetEvent| {
            Err(DeliveryError("connection closed".into()))
        });
        let _panics = bus.subscribe("panics", Some("org-1".into()), |_: &FleetEvent| {
            panic!("subscriber bug")
        });
        let _good = bus.subscribe("good", Some("org-1".into()), cb);

        let delivered = bus.broadcast_to_scope("org-1", &route_added("r1"));
        assert_eq!(delivered, 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_each_subscriber_gets_event_once() {
        let bus = EventBus::new();
        let (seen, cb) = recorder();
        let _s = bus.subscribe("a", None, cb);

        bus.broadcast(&route_added("r1"));
        assert_eq!(*seen.lock(), vec![route_added("r1")]);
    }

    #[test]
    fn test_resubscribe_replaces_and_stale_handle_is_noop() {
        let bus = EventBus::new();
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();

        let stale = bus.subscribe("conn", Some("org-1".into()), cb1);
        let current = bus.subscribe("conn", Some("org-1".into()), cb2);
        assert_eq!(bus.count(), 1);

        drop(stale);
        assert_eq!(bus.count(), 1);

        bus.broadcast_to_scope("org-1", &route_added("r1"));
        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);

        current.unsubscribe();
        assert_eq!(bus.count(), 0);
    }

    #[test]
    fn test_unsubscribe_count_and_clear() {
        let bus = EventBus::new();
        let s1 = bus.subscribe("a", None, |_: &FleetEvent| Ok(()));
        let _s2 = bus.subscribe("b", None, |_: &FleetEvent| Ok(()));
        assert_eq!(bus.count(), 2);

        assert!(bus.unsubscribe("a"));
        assert!(!bus.unsubscribe("a"));
        assert_eq!(bus.count(), 1);

        // handle for an already removed id is harmless
        drop(s1);

        bus.clear();
        assert_eq!(bus.count(), 0);
        assert_eq!(bus.broadcast(&route_added("r1")), 0);
    }

    #[test]
    fn test_registry_changes_during_broadcast() {
        let bus = EventBus::new();
        let (seen, cb) = recorder();

        let handle = bus.clone();
        let _churn = bus.subscribe("churn", None, move |_: &FleetEvent| {
            handle.unsubscribe("victim");
            std::mem::forget(handle.subscribe("late", None, |_: &FleetEvent| Ok(())));
            Ok(())
        });
        let _victim = bus.subscribe("victim", None, |_: &FleetEvent| Ok(()));
        let _observer = bus.subscribe("observer", None, cb);

        bus.broadcast(&route_added("r1"));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.count(), 3);
    }
}
