use std::cmp::Ordering;

use crate::compose::{Capabilities, Contribution, Host, Plugin};
use crate::error::Result;
use crate::store::Store;

/// Capability name used by [`array`].
pub const NAME: &str = "array";

/// Sequence verbs for `Vec` states.
///
/// Every verb builds a fresh `Vec` from the current one and commits it
/// through the store, so values handed out by earlier `get` calls are never
/// touched.
pub struct ArrayOps<E> {
    store: Store<Vec<E>>,
}

impl<E: Clone + Send + Sync + 'static> ArrayOps<E> {
    /// Wrap `store` with sequence verbs.
    pub fn new(store: Store<Vec<E>>) -> Self {
        Self { store }
    }

    /// Append items. Returns the new length.
    pub fn push<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = E>,
    {
        let mut len = 0;
        self.store.update(|current| {
            let mut next = current.clone();
            next.extend(items);
            len = next.len();
            next
        });
        len
    }

    /// Prepend items, keeping their order. Returns the new length.
    pub fn unshift<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = E>,
    {
        let mut len = 0;
        self.store.update(|current| {
            let mut next: Vec<E> = items.into_iter().collect();
            next.extend(current.iter().cloned());
            len = next.len();
            next
        });
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<E> {
        let mut removed = None;
        self.store.update(|current| {
            let mut next = current.clone();
            removed = next.pop();
            next
        });
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<E> {
        let mut removed = None;
        self.store.update(|current| {
            let mut next = current.clone();
            if !next.is_empty() {
                removed = Some(next.remove(0));
            }
            next
        });
        removed
    }

    /// Keep only the elements matching `keep`.
    pub fn filter<F>(&self, keep: F) -> bool
    where
        F: Fn(&E) -> bool,
    {
        self.store
            .update(|current| current.iter().filter(|item| keep(item)).cloned().collect())
    }

    /// Replace every element with `f(element)`.
    pub fn map<F>(&self, f: F) -> bool
    where
        F: Fn(&E) -> E,
    {
        self.store.update(|current| current.iter().map(&f).collect())
    }

    /// Stable sort by `compare`.
    pub fn sort_by<F>(&self, compare: F) -> bool
    where
        F: FnMut(&E, &E) -> Ordering,
    {
        self.store.update(|current| {
            let mut next = current.clone();
            next.sort_by(compare);
            next
        })
    }

    /// Reverse the element order.
    pub fn reverse(&self) -> bool {
        self.store
            .update(|current| current.iter().rev().cloned().collect())
    }

    /// Remove every element.
    pub fn clear(&self) -> bool {
        self.store.update(|_| Vec::new())
    }

    /// Number of elements.
    pub fn length(&self) -> usize {
        self.store.read(Vec::len)
    }
}

impl<E: Ord + Clone + Send + Sync + 'static> ArrayOps<E> {
    /// Stable sort in natural order.
    pub fn sort(&self) -> bool {
        self.sort_by(Ord::cmp)
    }
}

/// Plugin contributing [`ArrayOps`] under [`NAME`].
pub fn array<E: Clone + Send + Sync + 'static>() -> impl Plugin<Vec<E>> {
    |host: &Host<Vec<E>>| -> Result<Contribution<Vec<E>>> {
        let ops = ArrayOps::new(host.store().clone());
        Ok(Contribution::Capabilities(Capabilities::new().with(NAME, ops)))
    }
}
