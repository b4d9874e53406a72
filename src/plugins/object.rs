use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::compose::{Capabilities, Contribution, Host, Plugin};
use crate::error::Result;
use crate::store::{Store, Update};

/// Capability name used by [`object`].
pub const NAME: &str = "object";

/// Merge used by [`ObjectOps::patch_with`]: `(current, partial) -> next`.
pub type MergeFn<T> = Arc<dyn Fn(&T, T) -> T + Send + Sync>;

/// A state made of top-level keys.
pub trait Keyed: Clone {
    type Key: ?Sized;

    /// Overwrite this value's top-level keys with those of `patch`.
    fn merge_shallow(&mut self, patch: Self);

    fn remove_key(&mut self, key: &Self::Key) -> bool;

    fn key_count(&self) -> usize;
}

impl<K: Ord + Clone, V: Clone> Keyed for BTreeMap<K, V> {
    type Key = K;

    fn merge_shallow(&mut self, patch: Self) {
        self.extend(patch);
    }

    fn remove_key(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    fn key_count(&self) -> usize {
        self.len()
    }
}

impl<K, V, S> Keyed for HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    type Key = K;

    fn merge_shallow(&mut self, patch: Self) {
        self.extend(patch);
    }

    fn remove_key(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    fn key_count(&self) -> usize {
        self.len()
    }
}

impl Keyed for Map<String, Value> {
    type Key = str;

    fn merge_shallow(&mut self, patch: Self) {
        self.extend(patch);
    }

    fn remove_key(&mut self, key: &str) -> bool {
        self.remove(key).is_some()
    }

    fn key_count(&self) -> usize {
        self.len()
    }
}

/// JSON values behave as objects. Patching a non-object replaces it.
impl Keyed for Value {
    type Key = str;

    fn merge_shallow(&mut self, patch: Self) {
        match (self, patch) {
            (Value::Object(current), Value::Object(patch)) => current.extend(patch),
            (current, patch) => *current = patch,
        }
    }

    fn remove_key(&mut self, key: &str) -> bool {
        self.as_object_mut()
            .map(|object| object.remove(key).is_some())
            .unwrap_or(false)
    }

    fn key_count(&self) -> usize {
        self.as_object().map(Map::len).unwrap_or(0)
    }
}

/// Patch and remove verbs for keyed states.
pub struct ObjectOps<T> {
    store: Store<T>,
    merge: Option<MergeFn<T>>,
}

impl<T: Keyed + Send + Sync + 'static> ObjectOps<T> {
    /// Wrap `store` with shallow-overwrite patching.
    pub fn new(store: Store<T>) -> Self {
        Self { store, merge: None }
    }

    /// Use `merge` instead of a shallow overwrite for every patch.
    pub fn with_merge(store: Store<T>, merge: MergeFn<T>) -> Self {
        Self {
            store,
            merge: Some(merge),
        }
    }

    /// Merge `partial` onto the current state.
    pub fn patch(&self, partial: T) -> bool {
        self.patch_with(Update::Value(partial), None)
    }

    /// Merge `f(current)` onto the current state.
    pub fn patch_fn<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        self.patch_with(Update::with(f), None)
    }

    /// Resolve `update` against the current state and merge the result
    /// with `merge`, falling back to the capability's merge and then to a
    /// shallow overwrite of top-level keys.
    pub fn patch_with(
        &self,
        update: Update<'_, T>,
        merge: Option<&(dyn Fn(&T, T) -> T + Send + Sync)>,
    ) -> bool {
        let merge = merge.or(self.merge.as_deref());
        self.store.update(|current| {
            let partial = update.resolve(current);
            match merge {
                Some(merge) => merge(current, partial),
                None => {
                    let mut next = current.clone();
                    next.merge_shallow(partial);
                    next
                }
            }
        })
    }

    /// Drop one top-level key.
    pub fn remove(&self, key: &T::Key) -> bool {
        self.store.update(|current| {
            let mut next = current.clone();
            next.remove_key(key);
            next
        })
    }

    /// Number of top-level keys.
    pub fn size(&self) -> usize {
        self.store.read(|state| state.key_count())
    }
}

/// Plugin contributing [`ObjectOps`] under [`NAME`].
pub fn object<T: Keyed + Send + Sync + 'static>() -> impl Plugin<T> {
    |host: &Host<T>| -> Result<Contribution<T>> {
        let ops = ObjectOps::new(host.store().clone());
        Ok(Contribution::Capabilities(Capabilities::new().with(NAME, ops)))
    }
}

/// Like [`object`], with a custom default merge.
pub fn object_with_merge<T, F>(merge: F) -> impl Plugin<T>
where
    T: Keyed + Send + Sync + 'static,
    F: Fn(&T, T) -> T + Send + Sync + 'static,
{
    move |host: &Host<T>| -> Result<Contribution<T>> {
        let ops = ObjectOps::with_merge(host.store().clone(), Arc::new(merge));
        Ok(Contribution::Capabilities(Capabilities::new().with(NAME, ops)))
    }
}
