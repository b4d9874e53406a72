//! Built-in capability plugins.
//!
//! Each plugin closes over the host's store and exposes higher-level verbs
//! implemented on top of `get` and `update`:
//! - [`object()`] - `patch`, `remove`, `size` for keyed states
//! - [`array()`] - `push`, `unshift`, `filter`, `map`, `sort`, ... for `Vec` states
//! - [`reducer()`] - `dispatch` and `listen`
//! - [`persist()`] - load from and debounce writes to a [`Storage`]

pub mod array;
pub mod object;
pub mod persist;
pub mod reducer;

pub use array::{array, ArrayOps};
pub use object::{object, object_with_merge, Keyed, MergeFn, ObjectOps};
pub use persist::{persist, MemoryStorage, PersistOptions, Persisted, Storage};
pub use reducer::{reducer, Reducer};
