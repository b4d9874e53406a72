use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Deferred unit of work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle for a scheduled task, used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wrap a scheduler-specific task id, for custom [`Scheduler`]s.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id this handle wraps.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Source of time and delayed execution for caches and debouncers.
///
/// Everything in canister that waits goes through this trait, so tests can
/// swap the tokio timer for a [`ManualScheduler`] and step time by hand.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once `delay` has elapsed.
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Cancel a task that has not fired yet. Unknown handles are ignored.
    fn cancel(&self, handle: TimerHandle);

    /// Current instant on this scheduler's clock.
    fn now(&self) -> Instant;
}

/// Scheduler backed by the tokio timer.
///
/// Each task runs on its own spawned tokio task after sleeping, so this must
/// be used from inside a tokio runtime. Paused test time (`start_paused`) is
/// honoured because both the sleep and [`Scheduler::now`] read tokio's clock.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    timers: Arc<Mutex<BTreeMap<u64, tokio::task::AbortHandle>>>,
}

impl TokioScheduler {
    /// Create a scheduler on the ambient tokio runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = tokio::time::Instant::now() + delay;
        let timers = Arc::clone(&self.timers);

        // Hold the map lock across the spawn so a zero delay task cannot
        // finish and clean up before its handle is recorded.
        let mut guard = self.timers.lock();
        let join = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timers.lock().remove(&id);
            task();
        });
        guard.insert(id, join.abort_handle());
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(abort) = self.timers.lock().remove(&handle.0) {
            abort.abort();
        }
    }

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

struct ManualState {
    elapsed: Duration,
    next_id: u64,
    // Keyed by (due, id) so equal deadlines fire in scheduling order.
    queue: BTreeMap<(Duration, u64), Task>,
}

/// Fake clock for deterministic tests.
///
/// Nothing runs until [`ManualScheduler::advance`] moves time forward; due
/// tasks then fire in deadline order, outside the scheduler's own lock so
/// they may schedule or cancel further work.
///
/// # Examples
///
/// ```
/// use canister::runtime::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = ManualScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// clock.after(Duration::from_millis(5), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// clock.advance(Duration::from_millis(4));
/// assert!(!fired.load(Ordering::SeqCst));
/// clock.advance(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct ManualScheduler {
    origin: Instant,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Create a fake clock at time zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                next_id: 0,
                queue: BTreeMap::new(),
            }),
        })
    }

    /// Move the clock forward, firing every task that falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().elapsed + by;
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.queue.keys().next().copied() {
                    Some(key) if key.0 <= target => {
                        state.elapsed = state.elapsed.max(key.0);
                        state.queue.remove(&key)
                    }
                    _ => {
                        state.elapsed = target;
                        None
                    }
                }
            };
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    /// Number of tasks still waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.elapsed + delay;
        state.queue.insert((due, id), task);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.state.lock().queue.retain(|(_, id), _| *id != handle.0);
    }

    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }
}
