use std::sync::Arc;

use crate::compose::{Capabilities, Contribution, Host, Plugin};
use crate::error::Result;
use crate::store::{Detach, Listeners, Store, Subscription};

/// Capability name used by [`reducer`].
pub const NAME: &str = "reducer";

type ReduceFn<T, A> = dyn Fn(&T, &A) -> T + Send + Sync;
type Listener<T, A> = dyn Fn(&A, &T) + Send + Sync;

/// Action dispatch over a store.
///
/// Listeners registered with [`Reducer::listen`] hear every dispatched
/// action, including ones that leave the state unchanged; store subscribers
/// still only hear real changes.
pub struct Reducer<T, A> {
    store: Store<T>,
    reduce: Arc<ReduceFn<T, A>>,
    listeners: Arc<Listeners<Listener<T, A>>>,
}

impl<T, A> Reducer<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Create a reducer over `store`.
    pub fn new<F>(store: Store<T>, reduce: F) -> Self
    where
        F: Fn(&T, &A) -> T + Send + Sync + 'static,
    {
        Self {
            store,
            reduce: Arc::new(reduce),
            listeners: Arc::new(Listeners::new()),
        }
    }

    /// Run the reducer on the current state and commit the result.
    ///
    /// Returns whether the state changed.
    pub fn dispatch(&self, action: A) -> bool {
        let changed = self
            .store
            .update(|current| (self.reduce)(current, &action));

        let state = self.store.get();
        for listener in self.listeners.snapshot() {
            listener(&action, &state);
        }
        changed
    }

    /// Hear every dispatch as `(action, state_after)`.
    pub fn listen<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&A, &T) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(callback));
        let registry: Arc<dyn Detach> = self.listeners.clone();
        Subscription::new(id, Arc::downgrade(&registry))
    }
}

/// Plugin contributing a [`Reducer`] under [`NAME`].
pub fn reducer<T, A, F>(reduce: F) -> impl Plugin<T>
where
    T: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
    F: Fn(&T, &A) -> T + Send + Sync + 'static,
{
    move |host: &Host<T>| -> Result<Contribution<T>> {
        let reducer = Reducer::new(host.store().clone(), reduce);
        Ok(Contribution::Capabilities(Capabilities::new().with(NAME, reducer)))
    }
}
