use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::scheduler::{Scheduler, Task, TimerHandle};

/// Collapses bursts of calls into one trailing call.
///
/// Each [`Debouncer::call`] cancels the previously scheduled task and
/// schedules the new one `wait` from now, so only the last call in a burst
/// runs.
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    wait: Duration,
    pending: Arc<Mutex<Slot>>,
}

#[derive(Default)]
struct Slot {
    // Bumped on every call; a firing task only clears the slot it filled.
    round: u64,
    handle: Option<TimerHandle>,
}

impl Debouncer {
    /// Create a debouncer that waits `wait` after the last call.
    pub fn new(scheduler: Arc<dyn Scheduler>, wait: Duration) -> Self {
        Self {
            scheduler,
            wait,
            pending: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Schedule `task`, replacing whatever was waiting.
    pub fn call(&self, task: Task) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.handle.take() {
            self.scheduler.cancel(handle);
        }
        pending.round += 1;
        let round = pending.round;

        let slot = Arc::clone(&self.pending);
        let handle = self.scheduler.after(
            self.wait,
            Box::new(move || {
                {
                    let mut slot = slot.lock();
                    if slot.round == round {
                        slot.handle = None;
                    }
                }
                task();
            }),
        );
        pending.handle = Some(handle);
    }

    /// Drop the waiting task, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().handle.take() {
            Some(handle) => {
                self.scheduler.cancel(handle);
                true
            }
            None => false,
        }
    }

    /// Whether a task is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn only_last_call_in_burst_runs() {
        let clock = ManualScheduler::new();
        let debouncer = Debouncer::new(clock.clone(), Duration::from_millis(10));
        let last = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let last = last.clone();
            let runs = runs.clone();
            debouncer.call(Box::new(move || {
                last.store(i, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            }));
            clock.advance(Duration::from_millis(4));
        }
        assert!(debouncer.is_pending());

        clock.advance(Duration::from_millis(10));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    /// Scheduler whose cancel arrives too late: every task stays queued
    /// until the test fires it.
    #[derive(Default)]
    struct LateCancel {
        tasks: Mutex<Vec<Task>>,
    }

    impl Scheduler for LateCancel {
        fn after(&self, _: Duration, task: Task) -> TimerHandle {
            let mut tasks = self.tasks.lock();
            tasks.push(task);
            TimerHandle::new(tasks.len() as u64)
        }

        fn cancel(&self, _: TimerHandle) {}

        fn now(&self) -> std::time::Instant {
            std::time::Instant::now()
        }
    }

    #[test]
    fn stale_task_does_not_clear_newer_call() {
        let scheduler = Arc::new(LateCancel::default());
        let debouncer = Debouncer::new(scheduler.clone(), Duration::from_millis(10));

        debouncer.call(Box::new(|| {}));
        debouncer.call(Box::new(|| {}));
        let stale = scheduler.tasks.lock().remove(0);
        stale();
        assert!(debouncer.is_pending());

        let current = scheduler.tasks.lock().remove(0);
        current();
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn cancel_drops_waiting_task() {
        let clock = ManualScheduler::new();
        let debouncer = Debouncer::new(clock.clone(), Duration::from_millis(10));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        debouncer.call(Box::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        clock.advance(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
