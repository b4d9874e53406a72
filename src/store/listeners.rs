use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Ordered callback registry shared by stores and reducer listeners.
///
/// Entries keep insertion order and the same callback may be registered more
/// than once. Delivery always works on a snapshot, so a callback added or
/// removed mid-round neither receives nor misses that round.
pub(crate) struct Listeners<F: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Listeners<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, callback: Arc<F>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, callback));
        id
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<F: ?Sized + Send + Sync> Detach for Listeners<F> {
    fn detach(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Registration returned by `subscribe` and `listen`.
///
/// Dropping a `Subscription` leaves the callback registered; call
/// [`Subscription::unsubscribe`] or convert it with
/// [`Subscription::guard`] to tie the registration to a scope.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: Weak<dyn Detach>) -> Self {
        Self { id, registry }
    }

    /// Remove exactly this registration.
    ///
    /// Returns `false` when it was already removed or the store is gone;
    /// calling this any number of times is safe.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.detach(self.id))
            .unwrap_or(false)
    }

    /// Turn this registration into a guard that unsubscribes on drop.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

/// RAII guard that removes its registration when dropped.
pub struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn(u32) + Send + Sync;

    #[test]
    fn detach_removes_only_its_entry() {
        let listeners: Arc<Listeners<Callback>> = Arc::new(Listeners::new());
        let f: Arc<Callback> = Arc::new(|_: u32| {});
        let first = listeners.add(f.clone());
        let second = listeners.add(f);

        assert!(listeners.detach(first));
        assert!(!listeners.detach(first));
        assert_eq!(listeners.len(), 1);
        assert!(listeners.detach(second));
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_noop() {
        let listeners: Arc<Listeners<Callback>> = Arc::new(Listeners::new());
        let id = listeners.add(Arc::new(|_: u32| {}));
        let weak: Weak<dyn Detach> = Arc::downgrade(&listeners) as Weak<dyn Detach>;
        let subscription = Subscription::new(id, weak);
        drop(listeners);

        assert!(!subscription.unsubscribe());
    }
}
