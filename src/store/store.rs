use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use super::equality::Comparer;
use super::listeners::{Detach, Listeners, Subscription};

type Subscriber<T> = dyn Fn(&T, &T) + Send + Sync;

/// A requested state change: either a replacement value or a pure function
/// of the current value.
pub enum Update<'a, T> {
    Value(T),
    Updater(Box<dyn FnOnce(&T) -> T + 'a>),
}

impl<'a, T> Update<'a, T> {
    /// Replace the state with `value`.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Replace the state with `f(current)`.
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + 'a,
    {
        Self::Updater(Box::new(f))
    }

    /// Resolve against the current state.
    pub fn resolve(self, current: &T) -> T {
        match self {
            Self::Value(value) => value,
            Self::Updater(f) => f(current),
        }
    }
}

struct Inner<T> {
    state: RwLock<T>,
    subscribers: Arc<Listeners<Subscriber<T>>>,
    comparer: Comparer<T>,
    // Serializes writers. Reentrant so a subscriber may call `set` while
    // its own notification round is running.
    writer: ReentrantMutex<()>,
}

/// A thread-safe observable state container.
///
/// Holds one value, applies updates, and notifies subscribers with
/// `(old, new)` only when the comparer reports a change. Notification is
/// synchronous: every subscriber has run by the time `set` returns.
///
/// # Examples
///
/// ```
/// use canister::Store;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let store = Store::new(1);
/// let calls = Arc::new(AtomicUsize::new(0));
/// let calls_clone = calls.clone();
/// store.subscribe(move |old, new| {
///     assert_eq!((*old, *new), (1, 2));
///     calls_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// store.set(2);
/// store.set(2);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Store<T> {
    /// Create a new store that compares states with `PartialEq`.
    pub fn new(initial: T) -> Self {
        Self::with_comparer(initial, Comparer::structural())
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// Create a new store with a custom comparer.
    pub fn with_comparer(initial: T, comparer: Comparer<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(initial),
                subscribers: Arc::new(Listeners::new()),
                comparer,
                writer: ReentrantMutex::new(()),
            }),
        }
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Read state without cloning.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Replace the state with `value`. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        self.apply(Update::Value(value), None)
    }

    /// Replace the state with `f(current)`. Returns whether it changed.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        self.apply(Update::with(f), None)
    }

    /// Edit a copy of the state in place and commit it.
    pub fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        self.update(|current| {
            let mut next = current.clone();
            f(&mut next);
            next
        })
    }

    /// Resolve `update`, compare it with the current state and commit it if
    /// it differs.
    ///
    /// `equals` overrides the store's comparer for this one call. The
    /// updater and comparer run before anything is replaced, so a panic in
    /// either leaves the state untouched and unwinds to the caller.
    pub fn apply(&self, update: Update<'_, T>, equals: Option<&Comparer<T>>) -> bool {
        let _writer = self.inner.writer.lock();

        let old = self.get();
        let new = update.resolve(&old);
        let comparer = equals.unwrap_or(&self.inner.comparer);
        if comparer.equals(&old, &new) {
            return false;
        }

        *self.inner.state.write() = new.clone();

        for subscriber in self.inner.subscribers.snapshot() {
            subscriber(&old, &new);
        }
        true
    }

    /// Subscribe to state changes.
    ///
    /// The callback receives `(old, new)` after every accepted update, in
    /// registration order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.add(Arc::new(callback));
        let registry: Arc<dyn Detach> = self.inner.subscribers.clone();
        Subscription::new(id, Arc::downgrade(&registry))
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
