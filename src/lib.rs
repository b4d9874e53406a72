//! # Canister
//!
//! An observable state store with composable capability plugins.
//!
//! Canister is built from two cores:
//!
//! ## Store and composition
//!
//! - `Store<T>` - Holds one value, compares updates with a `Comparer` and
//!   notifies subscribers with `(old, new)` only on change
//! - `Host<T>` - Layers plugins onto a store; each plugin contributes named,
//!   typed capabilities (`object`, `array`, `reducer`, `persist`, `sync`)
//! - `Sealed<T>` - The frozen result of composition
//!
//! ## Cache and deduplicated sync
//!
//! - `Cache<K, V>` - Keyed cache with per-entry expiry driven by an injected
//!   `Scheduler`
//! - `Dedupe<V>` - Collapses concurrent identical async calls into one and
//!   optionally replays the settled result
//! - `Synchronizer<T, R>` - Deduplicated push, pull and delete against a
//!   user-supplied `Remote`

pub mod cache;
pub mod compose;
pub mod error;
pub mod plugins;
pub mod runtime;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use cache::{Cache, Eviction, Lifetime};
pub use compose::{Capabilities, Contribution, Host, Plugin, Sealed};
pub use error::{Error, Result};
pub use store::{Comparer, Store, Subscription, Update};
pub use sync::{Dedupe, Remote, SyncOptions, Synchronizer};
