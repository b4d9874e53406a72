use std::fmt;
use std::sync::Arc;

/// Decides whether a new state is "the same" as the current one.
///
/// A store only replaces its value and notifies subscribers when its
/// comparer says the two states differ.
pub struct Comparer<T> {
    eq: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> Comparer<T> {
    /// Build a comparer from any predicate.
    pub fn from_fn<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self { eq: Arc::new(eq) }
    }

    /// Comparer that treats every update as a change.
    pub fn never() -> Self {
        Self::from_fn(|_, _| false)
    }

    /// Whether `a` and `b` count as the same state.
    pub fn equals(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<T: PartialEq> Comparer<T> {
    /// Value equality through `PartialEq`. This is the store default.
    pub fn structural() -> Self {
        Self::from_fn(|a: &T, b: &T| a == b)
    }
}

impl<U: ?Sized> Comparer<Arc<U>> {
    /// Reference identity for shared states: equal only when both sides
    /// point at the same allocation.
    pub fn ptr_eq() -> Self {
        Self::from_fn(|a: &Arc<U>, b: &Arc<U>| Arc::ptr_eq(a, b))
    }
}

impl<T: PartialEq> Default for Comparer<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparer").finish_non_exhaustive()
    }
}
