//! Synchronous observer registry.
//!
//! Subscribers are called in registration order on the notifying thread. A
//! panicking subscriber is logged and skipped; the rest still run.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

// Subscriber isolation relies on unwinding.
#[cfg(not(panic = "unwind"))]
compile_error!("o2-core requires panic = \"unwind\"; a panicking subscriber would abort the agent");

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    next_id: AtomicU64,
    callbacks: RwLock<BTreeMap<u64, Callback<T>>>,
}

/// Registry of callbacks for values of type `T`.
pub struct Observers<T> {
    inner: Arc<Inner<T>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                callbacks: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Register `callback`. Dropping the returned handle does not
    /// unsubscribe; call [`Subscription::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.write().insert(id, Arc::new(callback));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.callbacks.write().remove(&id);
                }
            })),
        }
    }

    /// Deliver `value` to every subscriber.
    pub fn notify(&self, value: &T) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let callbacks: Vec<(u64, Callback<T>)> = self
            .inner
            .callbacks
            .read()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!(subscriber = id, "Observer callback panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Observers::subscribe`].
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_notify_in_order() {
        let observers = Observers::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let _a = observers.subscribe(move |v| s1.lock().push(("a", *v)));
        let s2 = Arc::clone(&seen);
        let _b = observers.subscribe(move |v| s2.lock().push(("b", *v)));

        observers.notify(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let observers = Observers::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let sub = observers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        observers.notify(&1);
        sub.unsubscribe();
        observers.notify(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let observers = Observers::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));

        let _bad = observers.subscribe(|_| panic!("boom"));
        let c = Arc::clone(&count);
        let _good = observers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        observers.notify(&1);
        observers.notify(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
