use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::compose::{Capabilities, Contribution, Host, Plugin};
use crate::error::{Error, Result};
use crate::runtime::{Debouncer, Scheduler};
use crate::store::{Store, Subscription};

/// Capability name used by [`persist`].
pub const NAME: &str = "persist";

/// String key/value storage that persisted stores read from and write to.
pub trait Storage: Send + Sync {
    /// Get the value for a key. Returns `None` if the key does not exist.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Set a key-value pair, replacing any existing value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory [`Storage`], mostly for tests.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Options for [`persist`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Storage key the state is kept under.
    pub key: String,
    /// Quiet period before a change is written.
    pub debounce: Duration,
}

impl PersistOptions {
    /// Options for storage key `key` with the default debounce.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the quiet period before a change is written.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key: String::new(),
            debounce: Duration::from_millis(100),
        }
    }
}

/// Handle on a store that mirrors itself into [`Storage`].
pub struct Persisted<T> {
    store: Store<T>,
    storage: Arc<dyn Storage>,
    key: String,
    debouncer: Arc<Debouncer>,
    subscription: Subscription,
}

impl<T> Persisted<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    /// Write the current state now, dropping any pending debounced write.
    pub fn flush(&self) -> Result<()> {
        self.debouncer.cancel();
        write(self.storage.as_ref(), &self.key, &self.store.get())
    }

    /// Storage key the state is kept under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop mirroring changes. A pending write is discarded.
    pub fn detach(&self) -> bool {
        self.debouncer.cancel();
        self.subscription.unsubscribe()
    }
}

fn write<T: Serialize>(storage: &dyn Storage, key: &str, state: &T) -> Result<()> {
    let raw = serde_json::to_string(state)?;
    storage.set_item(key, &raw)
}

/// Plugin that loads the store from `storage` and writes every change back
/// after a debounce.
///
/// Construction runs in two phases: the options are checked first, then the
/// stored value (if any) is loaded into the store before the capability is
/// exposed. A stored value that no longer decodes is logged and ignored so a
/// schema change cannot brick a store.
pub fn persist<T>(
    storage: Arc<dyn Storage>,
    scheduler: Arc<dyn Scheduler>,
    options: PersistOptions,
) -> impl Plugin<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    move |_: &Host<T>| -> Result<Contribution<T>> {
        if options.key.is_empty() {
            return Err(Error::plugin(NAME, "storage key must not be empty"));
        }

        Ok(Contribution::defer(move |host: &Host<T>| {
            let PersistOptions { key, debounce } = options;

            if let Some(raw) = storage.get_item(&key)? {
                match serde_json::from_str::<T>(&raw) {
                    Ok(stored) => {
                        host.set(stored);
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            %key,
                            "ignoring undecodable persisted state"
                        );
                    }
                }
            }

            let debouncer = Arc::new(Debouncer::new(scheduler, debounce));
            let subscription = {
                let storage = Arc::clone(&storage);
                let debouncer = Arc::clone(&debouncer);
                let key = key.clone();
                host.subscribe(move |_, new| {
                    let storage = Arc::clone(&storage);
                    let key = key.clone();
                    let state = new.clone();
                    debouncer.call(Box::new(move || {
                        if let Err(err) = write(storage.as_ref(), &key, &state) {
                            tracing::warn!(error = %err, %key, "persisting state failed");
                        }
                    }));
                })
            };

            let persisted = Persisted {
                store: host.store().clone(),
                storage,
                key,
                debouncer,
                subscription,
            };
            Ok(Contribution::Capabilities(
                Capabilities::new().with(NAME, persisted),
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStorage {
        inner: MemoryStorage,
        writes: AtomicUsize,
    }

    impl Storage for CountingStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_item(key, value)
        }
    }

    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get_item(&self, _: &str) -> Result<Option<String>> {
            Err(Error::storage("disk on fire"))
        }

        fn set_item(&self, _: &str, _: &str) -> Result<()> {
            Err(Error::storage("disk on fire"))
        }
    }

    fn counting() -> Arc<CountingStorage> {
        Arc::new(CountingStorage {
            inner: MemoryStorage::new(),
            writes: AtomicUsize::new(0),
        })
    }

    #[test]
    fn loads_stored_value_on_setup() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("prefs", "[1,2,3]").unwrap();

        let host = Host::new(Store::new(Vec::<i32>::new()))
            .with(persist(
                storage,
                ManualScheduler::new(),
                PersistOptions::new("prefs"),
            ))
            .unwrap();

        assert_eq!(host.get(), vec![1, 2, 3]);
    }

    #[test]
    fn writes_are_debounced() {
        let storage = counting();
        let clock = ManualScheduler::new();
        let host = Host::new(Store::new(0))
            .with(persist(
                storage.clone(),
                clock.clone(),
                PersistOptions::new("n").debounce(Duration::from_millis(50)),
            ))
            .unwrap();

        host.set(1);
        host.set(2);
        host.set(3);
        clock.advance(Duration::from_millis(49));
        assert_eq!(storage.writes.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.get_item("n").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn flush_writes_immediately() {
        let storage = counting();
        let clock = ManualScheduler::new();
        let host = Host::new(Store::new("a".to_string()))
            .with(persist(storage.clone(), clock.clone(), PersistOptions::new("s")))
            .unwrap();

        host.set("b".to_string());
        let persisted = host.capability::<Persisted<String>>(NAME).unwrap();
        persisted.flush().unwrap();
        clock.advance(Duration::from_secs(1));

        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.get_item("s").unwrap().as_deref(), Some("\"b\""));
    }

    #[test]
    fn detach_stops_mirroring() {
        let storage = counting();
        let clock = ManualScheduler::new();
        let host = Host::new(Store::new(0))
            .with(persist(storage.clone(), clock.clone(), PersistOptions::new("n")))
            .unwrap();

        assert!(host.capability::<Persisted<i32>>(NAME).unwrap().detach());
        host.set(5);
        clock.advance(Duration::from_secs(1));

        assert_eq!(storage.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn undecodable_value_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("n", "not json").unwrap();

        let host = Host::new(Store::new(9))
            .with(persist(storage, ManualScheduler::new(), PersistOptions::new("n")))
            .unwrap();

        assert_eq!(host.get(), 9);
    }

    #[test]
    fn empty_key_and_storage_failure_reject_plugin() {
        let base = Host::new(Store::new(0));

        let empty = base.with(persist(
            Arc::new(MemoryStorage::new()),
            ManualScheduler::new(),
            PersistOptions::default(),
        ));
        assert!(matches!(empty, Err(Error::Plugin { .. })));

        let broken = base.with(persist(
            Arc::new(BrokenStorage),
            ManualScheduler::new(),
            PersistOptions::new("n"),
        ));
        assert!(matches!(broken, Err(Error::Storage(_))));
        assert!(base.capabilities().is_empty());
    }
}
