//! Time and scheduling support.
//!
//! Caches, dedup windows and debounced writes never touch a global timer.
//! They receive a [`Scheduler`] and ask it for the time and for delayed work.

mod debounce;
mod scheduler;

pub use debounce::Debouncer;
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerHandle, TokioScheduler};
