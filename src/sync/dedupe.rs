use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt, Shared};

use crate::cache::{Cache, Eviction, Lifetime};
use crate::error::Result;
use crate::runtime::Scheduler;

/// A settled-or-pending call result that any number of callers can await.
pub type SharedResult<V> = Shared<BoxFuture<'static, Result<V>>>;

const PENDING: &str = "pending:";
const RESULT: &str = "result:";

/// Collapses concurrent calls with the same key into one underlying call,
/// and optionally replays its successful result for a while afterwards.
///
/// Both tiers live in one [`Cache`] under disjoint key prefixes:
/// - `pending:<key>` holds the in-flight call for the dedupe window and is
///   evicted as soon as the call settles.
/// - `result:<key>` holds a successful result for the cache window. A
///   failed call evicts it, so failures are never replayed.
pub struct Dedupe<V> {
    cache: Cache<String, SharedResult<V>>,
    dedupe: Lifetime,
    cache_for: Duration,
}

impl<V: Clone + Send + Sync + 'static> Dedupe<V> {
    /// Create a deduplicator that shares in-flight calls for `dedupe` and
    /// replays successful results for `cache_for`.
    pub fn new(scheduler: Arc<dyn Scheduler>, dedupe: Lifetime, cache_for: Duration) -> Self {
        Self {
            cache: Cache::new(scheduler),
            dedupe,
            cache_for,
        }
    }

    /// Run `call` unless an identical call is in flight or cached.
    ///
    /// `call` is only invoked on a miss, and the returned future is only
    /// driven while someone awaits it. There is no way to abort it once
    /// issued.
    pub fn run<F, Fut>(&self, key: &str, call: F) -> SharedResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let result_key = format!("{RESULT}{key}");
        if let Some(hit) = self.cache.get(&result_key) {
            tracing::trace!(%key, "dedupe result cache hit");
            return hit;
        }

        let pending_key = format!("{PENDING}{key}");
        let cache = self.cache.downgrade();
        let cache_for = self.cache_for;
        self.cache.get_or_insert_with(
            pending_key.clone(),
            move || {
                tracing::trace!(key = %pending_key, "dedupe miss, issuing call");
                let call = call();
                async move {
                    let result = call.await;
                    let Some(cache) = cache.upgrade() else {
                        return result;
                    };
                    cache.evict(&pending_key, Eviction::Now);
                    match &result {
                        Ok(value) if !cache_for.is_zero() => {
                            let settled = future::ready(Ok(value.clone())).boxed().shared();
                            cache.set(result_key, settled, Some(Lifetime::For(cache_for)));
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::debug!(
                                error = %err,
                                key = %pending_key,
                                "deduplicated call failed"
                            );
                            cache.evict(&result_key, Eviction::Now);
                        }
                    }
                    result
                }
                .boxed()
                .shared()
            },
            Some(self.dedupe),
        )
    }

    /// Forget both the in-flight call and the cached result for `key`.
    pub fn invalidate(&self, key: &str) {
        self.cache.evict(&format!("{PENDING}{key}"), Eviction::Now);
        self.cache.evict(&format!("{RESULT}{key}"), Eviction::Now);
    }

    /// Whether a call for `key` is currently in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        self.cache.contains(&format!("{PENDING}{key}"))
    }

    /// Whether a settled result for `key` is currently cached.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains(&format!("{RESULT}{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runtime::ManualScheduler;
    use futures::channel::oneshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dedupe(cache_for: Duration) -> (Arc<ManualScheduler>, Dedupe<i32>) {
        let clock = ManualScheduler::new();
        (clock.clone(), Dedupe::new(clock, Lifetime::Forever, cache_for))
    }

    #[test]
    fn concurrent_calls_share_one_invocation() {
        let (_, dedupe) = dedupe(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        let (tx, rx) = oneshot::channel::<i32>();
        let rx = rx.shared();

        let call = || {
            calls.fetch_add(1, Ordering::SeqCst);
            let rx = rx.clone();
            async move { Ok::<_, Error>(rx.await.unwrap_or(-1)) }
        };
        let first = dedupe.run("k", call);
        let second = dedupe.run("k", call);
        assert!(dedupe.is_pending("k"));

        tx.send(7).unwrap();
        let (a, b) = futures::executor::block_on(future::join(first, second));

        assert_eq!((a.unwrap(), b.unwrap()), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dedupe.is_pending("k"));
        assert!(!dedupe.is_cached("k"));
    }

    #[test]
    fn settled_result_is_replayed_until_window_ends() {
        let (clock, dedupe) = dedupe(Duration::from_millis(50));
        let calls = AtomicUsize::new(0);
        let call = || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as i32;
            async move { Ok::<_, Error>(n) }
        };

        assert_eq!(futures::executor::block_on(dedupe.run("k", call)).unwrap(), 0);
        assert_eq!(futures::executor::block_on(dedupe.run("k", call)).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(50));
        assert_eq!(futures::executor::block_on(dedupe.run("k", call)).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_reaches_all_waiters_and_is_not_cached() {
        let (_, dedupe) = dedupe(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let call = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::remote("pull", "offline")) }
        };

        let first = dedupe.run("k", call);
        let second = dedupe.run("k", call);
        let (a, b) = futures::executor::block_on(future::join(first, second));
        assert!(matches!(a, Err(Error::Remote { .. })));
        assert!(matches!(b, Err(Error::Remote { .. })));
        assert!(!dedupe.is_cached("k"));

        let again = futures::executor::block_on(dedupe.run("k", call));
        assert!(again.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_dedupe_window_disables_sharing() {
        let clock = ManualScheduler::new();
        let dedupe: Dedupe<i32> =
            Dedupe::new(clock, Lifetime::For(Duration::ZERO), Duration::ZERO);
        let calls = AtomicUsize::new(0);
        let call = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(1) }
        };

        let first = dedupe.run("k", call);
        let second = dedupe.run("k", call);
        futures::executor::block_on(future::join(first, second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidate_forces_fresh_call() {
        let (_, dedupe) = dedupe(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let call = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(1) }
        };

        futures::executor::block_on(dedupe.run("k", call)).unwrap();
        assert!(dedupe.is_cached("k"));
        dedupe.invalidate("k");
        futures::executor::block_on(dedupe.run("k", call)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn different_keys_do_not_share() {
        let (_, dedupe) = dedupe(Duration::ZERO);
        let a = dedupe.run("a", || async { Ok::<_, Error>(1) });
        let b = dedupe.run("b", || async { Ok::<_, Error>(2) });
        let (a, b) = futures::executor::block_on(future::join(a, b));
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
    }
}
