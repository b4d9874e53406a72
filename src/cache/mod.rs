//! Keyed cache with expiring entries.

mod cache;

pub use cache::{Cache, CacheOptions, Eviction, Lifetime, WeakCache};
