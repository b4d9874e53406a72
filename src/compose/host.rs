use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use super::capabilities::Capabilities;
use crate::error::{Error, Result};
use crate::store::Store;

/// How many times a plugin may defer before composition gives up.
pub const MAX_PLUGIN_DEPTH: usize = 32;

type Deferred<T> = Box<dyn FnOnce(&Host<T>) -> Result<Contribution<T>>>;

/// What a plugin hands back to [`Host::with`].
pub enum Contribution<T> {
    /// Terminal result: capabilities to merge onto the host.
    Capabilities(Capabilities),
    /// Run this again with the host before deciding what to contribute.
    Deferred(Deferred<T>),
    /// The plugin handed back the host itself and contributes nothing.
    Host,
}

impl<T> Contribution<T> {
    /// Run `next` with the host before contributing anything.
    pub fn defer<F>(next: F) -> Self
    where
        F: FnOnce(&Host<T>) -> Result<Contribution<T>> + 'static,
    {
        Self::Deferred(Box::new(next))
    }
}

impl<T> From<Capabilities> for Contribution<T> {
    fn from(capabilities: Capabilities) -> Self {
        Self::Capabilities(capabilities)
    }
}

/// Something that contributes capabilities to a [`Host`].
///
/// Any `FnOnce(&Host<T>) -> Result<Contribution<T>>` closure is a plugin.
pub trait Plugin<T> {
    fn build(self, host: &Host<T>) -> Result<Contribution<T>>;
}

impl<T, F> Plugin<T> for F
where
    F: FnOnce(&Host<T>) -> Result<Contribution<T>>,
{
    fn build(self, host: &Host<T>) -> Result<Contribution<T>> {
        self(host)
    }
}

/// A store plus the capabilities layered onto it so far.
///
/// Dereferences to the [`Store`], so `get`, `set` and `subscribe` are
/// always part of the surface.
///
/// # Examples
///
/// ```
/// use canister::compose::{Capabilities, Contribution, Host};
/// use canister::Store;
///
/// struct Total(Store<Vec<i32>>);
///
/// let host = Host::new(Store::new(vec![1, 2, 3]))
///     .with(|host: &Host<Vec<i32>>| {
///         let total = Total(host.store().clone());
///         Ok(Contribution::Capabilities(Capabilities::new().with("total", total)))
///     })
///     .unwrap()
///     .seal();
///
/// let total = host.capability::<Total>("total").unwrap();
/// assert_eq!(total.0.get().iter().sum::<i32>(), 6);
/// assert_eq!(host.get(), vec![1, 2, 3]);
/// ```
pub struct Host<T> {
    store: Store<T>,
    capabilities: Capabilities,
}

impl<T: Clone + Send + Sync + 'static> Host<T> {
    /// Start composing on top of `store` with no capabilities.
    pub fn new(store: Store<T>) -> Self {
        Self {
            store,
            capabilities: Capabilities::new(),
        }
    }

    /// The store every plugin on this host shares.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    /// Everything contributed so far.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Look up a capability by name and concrete type.
    pub fn capability<C: Any>(&self, name: &str) -> Option<&C> {
        self.capabilities.get(name)
    }

    /// Run `plugin` against this host until it yields a terminal
    /// contribution.
    ///
    /// Deferred contributions are re-run with the host, up to
    /// [`MAX_PLUGIN_DEPTH`] rounds.
    pub fn resolve<P: Plugin<T>>(&self, plugin: P) -> Result<Capabilities> {
        let mut contribution = plugin.build(self)?;
        let mut rounds = 0;
        loop {
            match contribution {
                Contribution::Capabilities(capabilities) => return Ok(capabilities),
                Contribution::Host => return Ok(Capabilities::new()),
                Contribution::Deferred(next) => {
                    rounds += 1;
                    if rounds > MAX_PLUGIN_DEPTH {
                        return Err(Error::DeferralLimit {
                            limit: MAX_PLUGIN_DEPTH,
                        });
                    }
                    contribution = next(self)?;
                }
            }
        }
    }

    /// Apply `plugin` and return a new host carrying the merged
    /// capabilities. `self` is left untouched, so a failing plugin merges
    /// nothing.
    pub fn with<P: Plugin<T>>(&self, plugin: P) -> Result<Host<T>> {
        let contributed = self.resolve(plugin)?;
        let mut capabilities = self.capabilities.clone();
        for name in capabilities.merge(contributed) {
            tracing::debug!(capability = %name, "capability overwritten by later plugin");
        }
        Ok(Host {
            store: self.store.clone(),
            capabilities,
        })
    }

    /// Freeze the composed surface. The result cannot be extended.
    pub fn seal(self) -> Sealed<T> {
        Sealed {
            inner: Arc::new(self),
        }
    }
}

impl<T> Deref for Host<T> {
    type Target = Store<T>;

    fn deref(&self) -> &Store<T> {
        &self.store
    }
}

/// The frozen result of composition: a store and a fixed capability set.
pub struct Sealed<T> {
    inner: Arc<Host<T>>,
}

impl<T: Clone + Send + Sync + 'static> Sealed<T> {
    /// The composed store.
    pub fn store(&self) -> &Store<T> {
        &self.inner.store
    }

    /// Look up a capability by name and concrete type.
    pub fn capability<C: Any>(&self, name: &str) -> Option<&C> {
        self.inner.capabilities.get(name)
    }

    /// Whether a capability is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.capabilities.contains(name)
    }

    /// Capability names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.capabilities.names()
    }
}

impl<T> Clone for Sealed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Sealed<T> {
    type Target = Store<T>;

    fn deref(&self) -> &Store<T> {
        &self.inner.store
    }
}
