use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Named, type-erased capability objects contributed by plugins.
///
/// Each entry is an `Arc<dyn Any>`, so cloning a capability set is cheap and
/// lookups downcast back to the concrete capability type.
#[derive(Clone, Default)]
pub struct Capabilities {
    entries: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Capabilities {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Capabilities::insert`].
    pub fn with<C>(mut self, name: impl Into<String>, capability: C) -> Self
    where
        C: Any + Send + Sync,
    {
        self.insert(name, capability);
        self
    }

    /// Add a capability. Returns `true` if an existing entry was replaced.
    pub fn insert<C>(&mut self, name: impl Into<String>, capability: C) -> bool
    where
        C: Any + Send + Sync,
    {
        self.entries
            .insert(name.into(), Arc::new(capability))
            .is_some()
    }

    /// Look up a capability by name and concrete type.
    ///
    /// Returns `None` if the name is unknown or holds a different type.
    pub fn get<C: Any>(&self, name: &str) -> Option<&C> {
        self.entries.get(name)?.downcast_ref::<C>()
    }

    /// Whether a capability is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Capability names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow merge; entries from `other` win.
    ///
    /// Returns the names that were overwritten. Overwriting is allowed, it
    /// is how a later plugin replaces an earlier one.
    pub fn merge(&mut self, other: Capabilities) -> Vec<String> {
        let mut overwritten = Vec::new();
        for (name, capability) in other.entries {
            if self.entries.insert(name.clone(), capability).is_some() {
                overwritten.push(name);
            }
        }
        overwritten
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_downcasts_to_stored_type() {
        let caps = Capabilities::new().with("answer", 42u32);
        assert_eq!(caps.get::<u32>("answer"), Some(&42));
        assert_eq!(caps.get::<i64>("answer"), None);
        assert_eq!(caps.get::<u32>("missing"), None);
    }

    #[test]
    fn merge_later_wins_and_reports_overwrites() {
        let mut base = Capabilities::new().with("a", 1u8).with("b", 2u8);
        let overwritten = base.merge(Capabilities::new().with("b", 20u8).with("c", 3u8));

        assert_eq!(overwritten, vec!["b".to_string()]);
        assert_eq!(base.get::<u8>("b"), Some(&20));
        assert_eq!(base.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
