//! Deduplicated remote synchronization.
//!
//! [`Dedupe`] is the generic layer: it collapses concurrent calls that share
//! an identity key and optionally replays settled results. [`Synchronizer`]
//! applies it to a store's push, pull and delete.

mod dedupe;
pub mod hash;
mod sync;

pub use dedupe::{Dedupe, SharedResult};
pub use hash::KeyFn;
pub use sync::{sync, Remote, SyncOptions, Synchronizer, NAME};
