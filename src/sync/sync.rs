use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::dedupe::Dedupe;
use super::hash::KeyFn;
use crate::cache::Lifetime;
use crate::compose::{Capabilities, Contribution, Host, Plugin};
use crate::error::{BoxError, Error, Result};
use crate::runtime::Scheduler;
use crate::store::Store;

/// Capability name used by [`sync`].
pub const NAME: &str = "sync";

/// The remote side of a synchronized store.
///
/// Implementations perform the actual I/O; the [`Synchronizer`] decides
/// when they are called.
pub trait Remote<T>: Send + Sync + 'static {
    /// Arguments identifying what to pull.
    type Args: Serialize + Send + 'static;
    /// Extra arguments sent along with the state on push and delete.
    type Extra: Serialize + Send + 'static;

    fn pull(&self, args: Self::Args) -> BoxFuture<'static, Result<T, BoxError>>;

    fn push(&self, state: T, extra: Self::Extra) -> BoxFuture<'static, Result<(), BoxError>>;

    fn delete(&self, state: T, extra: Self::Extra) -> BoxFuture<'static, Result<(), BoxError>>;
}

/// Options for [`Synchronizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// How long concurrent identical calls share one in-flight call.
    pub dedupe: Lifetime,
    /// How long a successful result is replayed. Zero disables replay.
    pub cache: Duration,
    /// Identity derivation for call inputs.
    #[serde(skip)]
    pub key: KeyFn,
}

impl SyncOptions {
    /// Set the window in which identical calls share one in-flight call.
    pub fn dedupe(mut self, dedupe: Lifetime) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Set how long a successful result is replayed.
    pub fn cache(mut self, cache: Duration) -> Self {
        self.cache = cache;
        self
    }

    /// Set the identity derivation for call inputs.
    pub fn key(mut self, key: KeyFn) -> Self {
        self.key = key;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dedupe: Lifetime::Forever,
            cache: Duration::ZERO,
            key: KeyFn::default(),
        }
    }
}

/// Deduplicated push, pull and delete for one store.
///
/// Pull identity is derived from the pull arguments alone. Push and delete
/// identity covers the current state plus the extra arguments, because the
/// state is what is being sent. Each operation keeps its own identity
/// space, so a pull never shares a call with a push.
///
/// A pulled value is written to the store once per underlying call, as
/// that call settles, no matter how many callers were deduplicated onto
/// it. Replays from the result cache do not write again. Overlapping pulls
/// with different arguments leave the store holding whichever settled last.
pub struct Synchronizer<T, R> {
    store: Store<T>,
    remote: Arc<R>,
    key: KeyFn,
    pulls: Dedupe<T>,
    writes: Dedupe<()>,
}

impl<T, R> Synchronizer<T, R>
where
    T: Clone + Serialize + Send + Sync + 'static,
    R: Remote<T>,
{
    /// Create a synchronizer for `store` backed by `remote`.
    pub fn new(
        store: Store<T>,
        remote: R,
        scheduler: Arc<dyn Scheduler>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            remote: Arc::new(remote),
            key: options.key,
            pulls: Dedupe::new(Arc::clone(&scheduler), options.dedupe, options.cache),
            writes: Dedupe::new(scheduler, options.dedupe, options.cache),
        }
    }

    /// Pull a value and write it to the store.
    pub async fn pull(&self, args: R::Args) -> Result<T> {
        let key = self.pull_key(&args)?;
        let remote = Arc::clone(&self.remote);
        let store = self.store.clone();
        self.pulls
            .run(&key, move || {
                let call = remote.pull(args);
                async move {
                    match call.await {
                        Ok(value) => {
                            store.set(value.clone());
                            Ok(value)
                        }
                        Err(err) => Err(Error::remote("pull", err)),
                    }
                }
            })
            .await
    }

    /// Push the current state.
    pub async fn push(&self, extra: R::Extra) -> Result<()> {
        let state = self.store.get();
        let key = self.write_key("push", &state, &extra)?;
        let remote = Arc::clone(&self.remote);
        self.writes
            .run(&key, move || {
                let call = remote.push(state, extra);
                async move { call.await.map_err(|err| Error::remote("push", err)) }
            })
            .await
    }

    /// Delete the current state remotely.
    pub async fn delete(&self, extra: R::Extra) -> Result<()> {
        let state = self.store.get();
        let key = self.write_key("delete", &state, &extra)?;
        let remote = Arc::clone(&self.remote);
        self.writes
            .run(&key, move || {
                let call = remote.delete(state, extra);
                async move { call.await.map_err(|err| Error::remote("delete", err)) }
            })
            .await
    }

    /// Identity of a pull with `args`.
    pub fn pull_key(&self, args: &R::Args) -> Result<String> {
        self.key.key(args)
    }

    /// Drop any in-flight or cached pull for `args`.
    pub fn invalidate_pull(&self, args: &R::Args) -> Result<()> {
        self.pulls.invalidate(&self.pull_key(args)?);
        Ok(())
    }

    /// The store pulls are written to.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    fn write_key(&self, op: &str, state: &T, extra: &R::Extra) -> Result<String> {
        Ok(format!("{op}:{}", self.key.key(&(state, extra))?))
    }
}

/// Plugin contributing a [`Synchronizer`] under [`NAME`].
pub fn sync<T, R>(
    remote: R,
    scheduler: Arc<dyn Scheduler>,
    options: SyncOptions,
) -> impl Plugin<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
    R: Remote<T>,
{
    move |host: &Host<T>| -> Result<Contribution<T>> {
        let synchronizer = Synchronizer::new(host.store().clone(), remote, scheduler, options);
        Ok(Contribution::Capabilities(
            Capabilities::new().with(NAME, synchronizer),
        ))
    }
}
