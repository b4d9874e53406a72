use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::runtime::{Scheduler, TimerHandle};

/// How long a cache entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifetime {
    /// Kept until explicitly evicted.
    Forever,
    /// Evicted once the duration elapses. A zero duration means the value
    /// is never stored at all, which is how caching is switched off.
    For(Duration),
}

impl Lifetime {
    /// Shorthand for `Lifetime::For(Duration::from_millis(ms))`.
    pub fn millis(ms: u64) -> Self {
        Self::For(Duration::from_millis(ms))
    }

    /// Whether a value with this lifetime would be dropped on arrival.
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::For(d) if d.is_zero())
    }
}

impl From<Duration> for Lifetime {
    fn from(duration: Duration) -> Self {
        Self::For(duration)
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::Forever
    }
}

/// When [`Cache::evict`] removes an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Now,
    /// Do nothing.
    Never,
    /// Remove after the delay; a zero delay behaves like [`Eviction::Now`].
    After(Duration),
}

/// Options for [`Cache`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Lifetime used when `set` or `get_or_insert_with` is given none.
    pub default_lifetime: Lifetime,
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
    generation: u64,
    timers: Vec<TimerHandle>,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_generation: u64,
}

struct Inner<K, V> {
    state: Mutex<State<K, V>>,
    scheduler: Arc<dyn Scheduler>,
    options: CacheOptions,
}

/// Keyed cache with per-entry expiry.
///
/// Expiry is enforced twice: a scheduled task removes the entry when its
/// lifetime elapses, and reads treat an entry past its deadline as absent
/// even if that task has not run yet. Every entry carries a generation so a
/// timer scheduled for a replaced entry never removes its successor.
///
/// All operations lock the cache for their whole duration, including the
/// factory passed to [`Cache::get_or_insert_with`]. That factory must not
/// call back into the same cache.
///
/// # Examples
///
/// ```
/// use canister::cache::{Cache, Lifetime};
/// use canister::runtime::ManualScheduler;
/// use std::time::Duration;
///
/// let clock = ManualScheduler::new();
/// let cache = Cache::new(clock.clone());
///
/// cache.set("k", 1, Some(Lifetime::millis(5)));
/// assert_eq!(cache.get(&"k"), Some(1));
///
/// clock.advance(Duration::from_millis(6));
/// assert_eq!(cache.get(&"k"), None);
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache with default options.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_options(scheduler, CacheOptions::default())
    }

    /// Create an empty cache with `options`.
    pub fn with_options(scheduler: Arc<dyn Scheduler>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    next_generation: 0,
                }),
                scheduler,
                options,
            }),
        }
    }

    /// Store `value` under `key` and hand it back.
    ///
    /// `None` uses the configured default lifetime. Any previous entry for
    /// the key is replaced and its timers cancelled.
    pub fn set(&self, key: K, value: V, lifetime: Option<Lifetime>) -> V {
        let mut state = self.inner.state.lock();
        self.insert_locked(&mut state, key, value.clone(), lifetime);
        value
    }

    /// Get the live value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.inner.state.lock();
        self.live_locked(&mut state, key).map(|entry| entry.value.clone())
    }

    /// Get the live value for `key`, or build it with `factory`, store it
    /// with `lifetime` and return it.
    pub fn get_or_insert_with<F>(&self, key: K, factory: F, lifetime: Option<Lifetime>) -> V
    where
        F: FnOnce() -> V,
    {
        let mut state = self.inner.state.lock();
        if let Some(entry) = self.live_locked(&mut state, &key) {
            return entry.value.clone();
        }

        let value = factory();
        self.insert_locked(&mut state, key, value.clone(), lifetime);
        value
    }

    /// Remove the entry for `key` now, later, or not at all.
    pub fn evict(&self, key: &K, when: Eviction) {
        let delay = match when {
            Eviction::Never => return,
            Eviction::Now => Duration::ZERO,
            Eviction::After(delay) => delay,
        };

        let mut state = self.inner.state.lock();
        if delay.is_zero() {
            if let Some(entry) = state.entries.remove(key) {
                self.cancel_timers(&entry);
                tracing::trace!(generation = entry.generation, "cache entry evicted");
            }
            return;
        }

        let now = self.inner.scheduler.now();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        let deadline = now + delay;
        entry.expires_at = Some(entry.expires_at.map_or(deadline, |at| at.min(deadline)));
        let timer = self.schedule_removal(key.clone(), entry.generation, delay);
        entry.timers.push(timer);
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        let mut state = self.inner.state.lock();
        self.live_locked(&mut state, key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.inner.scheduler.now();
        let state = self.inner.state.lock();
        state
            .entries
            .values()
            .filter(|entry| !is_expired(entry, now))
            .count()
    }

    /// Whether no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-owning handle, for values stored in this cache that need to
    /// reach back into it.
    pub fn downgrade(&self) -> WeakCache<K, V> {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Drop every entry and cancel every pending eviction.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for (_, entry) in state.entries.drain() {
            self.cancel_timers(&entry);
        }
    }

    fn insert_locked(
        &self,
        state: &mut State<K, V>,
        key: K,
        value: V,
        lifetime: Option<Lifetime>,
    ) {
        if let Some(old) = state.entries.remove(&key) {
            self.cancel_timers(&old);
        }

        let lifetime = lifetime.unwrap_or(self.inner.options.default_lifetime);
        let generation = state.next_generation;
        state.next_generation += 1;

        let (expires_at, timers) = match lifetime {
            Lifetime::For(duration) if duration.is_zero() => {
                tracing::trace!(generation, "zero lifetime, value not cached");
                return;
            }
            Lifetime::Forever => (None, Vec::new()),
            Lifetime::For(duration) => {
                let timer = self.schedule_removal(key.clone(), generation, duration);
                (Some(self.inner.scheduler.now() + duration), vec![timer])
            }
        };

        state.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                generation,
                timers,
            },
        );
    }

    fn live_locked<'a>(&self, state: &'a mut State<K, V>, key: &K) -> Option<&'a Entry<V>> {
        let now = self.inner.scheduler.now();
        let expired = is_expired(state.entries.get(key)?, now);
        if expired {
            if let Some(entry) = state.entries.remove(key) {
                self.cancel_timers(&entry);
            }
            return None;
        }
        state.entries.get(key)
    }

    fn schedule_removal(&self, key: K, generation: u64, delay: Duration) -> TimerHandle {
        let inner: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        self.inner.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.remove_generation(&key, generation);
                }
            }),
        )
    }

    fn cancel_timers(&self, entry: &Entry<V>) {
        for timer in &entry.timers {
            self.inner.scheduler.cancel(*timer);
        }
    }
}

impl<K: Hash + Eq, V> Inner<K, V> {
    fn remove_generation(&self, key: &K, generation: u64) {
        let mut state = self.state.lock();
        let current = state.entries.get(key).map(|entry| entry.generation);
        if current == Some(generation) {
            if let Some(entry) = state.entries.remove(key) {
                // Sibling timers for this entry are now pointless.
                for timer in entry.timers {
                    self.scheduler.cancel(timer);
                }
            }
            tracing::trace!(generation, "cache entry expired");
        }
    }
}

fn is_expired<V>(entry: &Entry<V>, now: Instant) -> bool {
    entry.expires_at.is_some_and(|at| now >= at)
}

/// Weak counterpart of [`Cache`].
pub struct WeakCache<K, V> {
    inner: Weak<Inner<K, V>>,
}

impl<K, V> WeakCache<K, V> {
    /// Get the cache back if it is still alive.
    pub fn upgrade(&self) -> Option<Cache<K, V>> {
        self.inner.upgrade().map(|inner| Cache { inner })
    }
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (Arc<ManualScheduler>, Cache<&'static str, i32>) {
        let clock = ManualScheduler::new();
        (clock.clone(), Cache::new(clock))
    }

    #[test]
    fn entry_expires_after_lifetime() {
        let (clock, cache) = cache();

        assert_eq!(cache.set("k", 1, Some(Lifetime::millis(5))), 1);
        assert_eq!(cache.get(&"k"), Some(1));

        clock.advance(Duration::from_millis(6));
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn zero_lifetime_is_not_stored() {
        let (clock, cache) = cache();

        assert_eq!(cache.set("k", 1, Some(Lifetime::For(Duration::ZERO))), 1);
        assert!(!cache.contains(&"k"));
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn zero_lifetime_replaces_existing_entry() {
        let (_, cache) = cache();

        cache.set("k", 1, None);
        cache.set("k", 2, Some(Lifetime::For(Duration::ZERO)));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn forever_survives_time() {
        let (clock, cache) = cache();

        cache.set("k", 1, Some(Lifetime::Forever));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(cache.get(&"k"), Some(1));
    }

    #[test]
    fn default_lifetime_comes_from_options() {
        let clock = ManualScheduler::new();
        let cache = Cache::with_options(
            clock.clone(),
            CacheOptions {
                default_lifetime: Lifetime::millis(10),
            },
        );

        cache.set("k", 1, None);
        clock.advance(Duration::from_millis(10));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn factory_runs_once_on_miss() {
        let (_, cache) = cache();
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        };

        assert_eq!(cache.get_or_insert_with("k", factory, None), 42);
        assert_eq!(cache.get_or_insert_with("k", || unreachable!(), None), 42);
        assert_eq!(cache.get(&"k"), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn miss_without_factory_is_none() {
        let (_, cache) = cache();
        assert_eq!(cache.get(&"nope"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn replaced_entry_is_not_evicted_by_stale_timer() {
        let (clock, cache) = cache();

        cache.set("k", 1, Some(Lifetime::millis(5)));
        clock.advance(Duration::from_millis(3));
        cache.set("k", 2, Some(Lifetime::millis(5)));
        clock.advance(Duration::from_millis(3));

        assert_eq!(cache.get(&"k"), Some(2));
        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn evict_now_never_and_later() {
        let (clock, cache) = cache();
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);

        cache.evict(&"a", Eviction::Now);
        cache.evict(&"b", Eviction::Never);
        cache.evict(&"c", Eviction::After(Duration::from_millis(10)));
        cache.evict(&"missing", Eviction::After(Duration::from_millis(10)));

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));

        clock.advance(Duration::from_millis(10));
        assert_eq!(cache.get(&"c"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_delay_evicts_immediately() {
        let (_, cache) = cache();
        cache.set("a", 1, None);
        cache.evict(&"a", Eviction::After(Duration::ZERO));
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn clear_cancels_timers() {
        let (clock, cache) = cache();
        cache.set("a", 1, Some(Lifetime::millis(5)));
        cache.set("b", 2, Some(Lifetime::millis(5)));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(clock.pending(), 0);
    }
}
