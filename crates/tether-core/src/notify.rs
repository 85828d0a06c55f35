//! Change events, listener registries, and RAII subscriptions.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order, outside the registry
//!    lock (a listener may re-enter and subscribe/unsubscribe).
//! 2. Dropping a [`Subscription`] removes the listener before the next
//!    notification cycle (deterministic release, no lazy sweep).
//! 3. A no-op subscription is always safe to hold and drop.
//!
//! Subscribing the same listener twice yields two independent
//! subscriptions; de-duplication is left to adapters that need it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A change notification raised by an observable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A named member's value changed.
    Member { name: Arc<str> },
    /// An indexed element changed.
    Index { index: usize },
}

impl ChangeEvent {
    /// Convenience constructor for a member change.
    #[must_use]
    pub fn member(name: impl Into<Arc<str>>) -> Self {
        Self::Member { name: name.into() }
    }
}

/// Listener callback invoked on the thread that raised the change.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Registry {
    entries: Mutex<Vec<(u64, ChangeListener)>>,
    next_id: AtomicU64,
}

/// An ordered set of change listeners with RAII unsubscription.
pub struct ListenerSet {
    registry: Arc<Registry>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener; the returned guard unsubscribes on drop.
    pub fn subscribe(&self, listener: ChangeListener) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .entries
            .lock()
            .expect("listener registry poisoned")
            .push((id, listener));
        Subscription {
            registry: Some(Arc::downgrade(&self.registry)),
            id,
        }
    }

    /// Notify all listeners in registration order.
    pub fn notify(&self, event: &ChangeEvent) {
        // Snapshot under the lock so listeners can re-enter the registry.
        let snapshot: Vec<ChangeListener> = self
            .registry
            .entries
            .lock()
            .expect("listener registry poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry
            .entries
            .lock()
            .expect("listener registry poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard for a registered listener.
///
/// Dropping the guard removes the listener. [`Subscription::none`] yields an
/// inert guard used when an adapter cannot observe a target.
pub struct Subscription {
    registry: Option<Weak<Registry>>,
    id: u64,
}

impl Subscription {
    /// An inert subscription: holding or dropping it does nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            registry: None,
            id: 0,
        }
    }

    /// Whether this subscription is attached to a live registry.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            let mut entries = registry.entries.lock().expect("listener registry poisoned");
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_and_notify() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = set.subscribe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        set.notify(&ChangeEvent::member("Name"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_unsubscribes() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = set.subscribe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(set.len(), 1);
        drop(sub);
        assert_eq!(set.len(), 0);
        set.notify(&ChangeEvent::member("Name"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registration_order_preserved() {
        let set = ListenerSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let o2 = Arc::clone(&order);
        let _a = set.subscribe(Arc::new(move |_| o1.lock().unwrap().push(1)));
        let _b = set.subscribe(Arc::new(move |_| o2.lock().unwrap().push(2)));
        set.notify(&ChangeEvent::member("X"));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn noop_subscription_is_inert() {
        let sub = Subscription::none();
        assert!(!sub.is_active());
        drop(sub);
    }

    #[test]
    fn listener_may_unsubscribe_during_notify() {
        let set = ListenerSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let sub = set.subscribe(Arc::new(move |_| {
            // Dropping our own subscription mid-notification must not deadlock.
            inner.lock().unwrap().take();
        }));
        *slot.lock().unwrap() = Some(sub);
        set.notify(&ChangeEvent::member("X"));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn same_listener_twice_fires_twice() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener: ChangeListener = Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let _a = set.subscribe(Arc::clone(&listener));
        let _b = set.subscribe(listener);
        set.notify(&ChangeEvent::member("X"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
