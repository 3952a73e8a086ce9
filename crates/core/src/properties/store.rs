//! The per-build property store.

use br_protocol::property_models::{PropertyEntry, PropertyValue};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors raised by property lookups that require the name to exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("no property named '{0}'")]
    NotFound(String),
}

/// Type alias for Result with PropertyError.
pub type PropertyResult<T> = Result<T, PropertyError>;

/// Mapping of property name to `(value, source)`, plus the set of names
/// that were set at runtime.
///
/// A store belongs to exactly one build. Reporting code reads snapshots
/// produced by [`PropertyStore::as_list`] or [`PropertyStore::as_dict`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyStore {
    properties: BTreeMap<String, (Value, String)>,
    runtime: BTreeSet<String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a snapshot, restoring runtime flags.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a PropertyEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.set(
                entry.name.clone(),
                entry.value.clone(),
                entry.source.clone(),
                entry.runtime,
            );
        }
        store
    }

    /// The stored value, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|(value, _)| value)
    }

    /// The stored value, or `default` when the name is absent.
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.get(name).cloned().unwrap_or(default)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Sets `name`, overwriting any previous value and source.
    ///
    /// # Arguments
    ///
    /// * `name` - Property name
    /// * `value` - New value
    /// * `source` - Where the value came from, e.g. a step name
    /// * `runtime` - Whether the value was produced during execution
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        source: impl Into<String>,
        runtime: bool,
    ) {
        let name = name.into();
        if runtime {
            self.runtime.insert(name.clone());
        }
        self.properties.insert(name, (value.into(), source.into()));
    }

    /// The source recorded for `name`.
    ///
    /// # Errors
    ///
    /// Returns `PropertyError::NotFound` if the name is absent.
    pub fn source_of(&self, name: &str) -> PropertyResult<&str> {
        self.properties
            .get(name)
            .map(|(_, source)| source.as_str())
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))
    }

    pub fn is_runtime(&self, name: &str) -> bool {
        self.runtime.contains(name)
    }

    /// Removes `name`, returning its value and source.
    pub fn remove(&mut self, name: &str) -> Option<(Value, String)> {
        self.runtime.remove(name);
        self.properties.remove(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// All properties sorted by name.
    pub fn as_list(&self) -> Vec<PropertyEntry> {
        self.properties
            .iter()
            .map(|(name, (value, source))| PropertyEntry {
                name: name.clone(),
                value: value.clone(),
                source: source.clone(),
                runtime: self.runtime.contains(name),
            })
            .collect()
    }

    /// All properties as a plain `name -> {value, source}` mapping.
    pub fn as_dict(&self) -> BTreeMap<String, PropertyValue> {
        self.properties
            .iter()
            .map(|(name, (value, source))| {
                (
                    name.clone(),
                    PropertyValue {
                        value: value.clone(),
                        source: source.clone(),
                    },
                )
            })
            .collect()
    }

    /// Sets every entry of `values` with one shared source.
    pub fn update<I, K>(&mut self, values: I, source: &str, runtime: bool)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in values {
            self.set(name, value, source, runtime);
        }
    }

    /// Copies every entry of `other` into this store.
    ///
    /// With `include_runtime` the runtime flags are carried over as well;
    /// without it, names in `other`'s runtime set are skipped entirely.
    pub fn merge_from(&mut self, other: &PropertyStore, include_runtime: bool) {
        for (name, (value, source)) in &other.properties {
            if !include_runtime && other.runtime.contains(name) {
                continue;
            }
            self.properties
                .insert(name.clone(), (value.clone(), source.clone()));
        }
        if include_runtime {
            self.runtime.extend(other.runtime.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get_and_source() {
        let mut store = PropertyStore::new();
        store.set("do-tests", 1, "scheduler", false);
        store.set("do-install", 2, "scheduler", false);

        assert!(store.has("do-tests"));
        assert_eq!(store.get("do-tests"), Some(&json!(1)));
        assert_eq!(store.source_of("do-install").unwrap(), "scheduler");
        assert_eq!(store.get("do-nothing"), None);
        assert_eq!(
            store.source_of("do-nothing"),
            Err(PropertyError::NotFound("do-nothing".to_string()))
        );
    }

    #[test]
    fn test_get_or_returns_default_for_missing() {
        let store = PropertyStore::new();
        assert_eq!(store.get_or("missing", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_set_overwrites_value_and_source() {
        let mut store = PropertyStore::new();
        store.set("x", 1, "first", false);
        store.set("x", 2, "second", false);

        assert_eq!(store.get("x"), Some(&json!(2)));
        assert_eq!(store.source_of("x").unwrap(), "second");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_keeps_unrelated_entries() {
        let mut store = PropertyStore::new();
        store.set("x", 24, "old", false);
        store.update([("a", json!(1)), ("b", json!(2))], "new", false);

        assert_eq!(store.get("x"), Some(&json!(24)));
        assert_eq!(store.source_of("x").unwrap(), "old");
        assert_eq!(store.get("a"), Some(&json!(1)));
        assert_eq!(store.source_of("a").unwrap(), "new");
    }

    #[test]
    fn test_merge_from_with_runtime() {
        let mut store = PropertyStore::new();
        store.set("a", 94, "old", false);
        store.set("x", 24, "old", false);

        let mut other = PropertyStore::new();
        other.set("a", 1, "new", true);
        other.set("b", 2, "new", false);
        store.merge_from(&other, true);

        assert_eq!(store.get("x"), Some(&json!(24)));
        assert_eq!(store.get("a"), Some(&json!(1)));
        assert_eq!(store.source_of("a").unwrap(), "new");
        assert!(store.is_runtime("a"));
        assert!(!store.is_runtime("b"));
    }

    #[test]
    fn test_merge_from_without_runtime_skips_runtime_names() {
        let mut store = PropertyStore::new();
        store.set("a", 94, "old", false);
        store.set("b", 84, "old", false);
        store.set("x", 24, "old", false);

        let mut other = PropertyStore::new();
        other.set("a", 1, "new", true);
        other.set("b", 2, "new", false);
        other.set("c", 3, "new", true);
        other.set("d", 3, "new", false);
        store.merge_from(&other, false);

        assert_eq!(store.get("a"), Some(&json!(94)));
        assert_eq!(store.source_of("a").unwrap(), "old");
        assert_eq!(store.get("b"), Some(&json!(2)));
        assert_eq!(store.get("c"), None);
        assert_eq!(store.get("d"), Some(&json!(3)));
        assert_eq!(store.get("x"), Some(&json!(24)));
        assert!(!store.is_runtime("a"));
    }

    #[test]
    fn test_as_list_is_sorted_and_flags_runtime() {
        let mut store = PropertyStore::new();
        store.set("zeta", "z", "test", false);
        store.set("alpha", "a", "test", true);

        let list = store.as_list();
        let names: Vec<_> = list.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(list[0].runtime);
        assert!(!list[1].runtime);
    }

    #[test]
    fn test_remove_clears_runtime_flag() {
        let mut store = PropertyStore::new();
        store.set("branch", "main", "Build", true);

        let removed = store.remove("branch");
        assert_eq!(removed, Some((json!("main"), "Build".to_string())));
        assert!(!store.is_runtime("branch"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_entries_round_trips_snapshot() {
        let mut store = PropertyStore::new();
        store.set("branch", "main", "Build", false);
        store.set("got_revision", "abc", "git", true);

        let restored = PropertyStore::from_entries(&store.as_list());
        assert_eq!(restored, store);
    }
}
