//! Build properties.
//!
//! Every build owns one [`PropertyStore`]. External collaborators (steps,
//! status reporters) reach it only through the [`Properties`] contract.

pub mod store;

pub use store::{PropertyError, PropertyResult, PropertyStore};

use br_protocol::property_models::{PropertyEntry, PropertyValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// The property persistence contract shared by stores and builds.
pub trait Properties {
    /// The value of `name`, or `default` if unset.
    fn get_property(&self, name: &str, default: Value) -> Value;

    fn set_property(&mut self, name: &str, value: Value, source: &str, runtime: bool);

    fn has_property(&self, name: &str) -> bool;

    /// Plain `name -> {value, source}` mapping.
    fn as_dict(&self) -> BTreeMap<String, PropertyValue>;

    /// Entries sorted by name.
    fn as_list(&self) -> Vec<PropertyEntry>;
}

impl Properties for PropertyStore {
    fn get_property(&self, name: &str, default: Value) -> Value {
        self.get_or(name, default)
    }

    fn set_property(&mut self, name: &str, value: Value, source: &str, runtime: bool) {
        self.set(name, value, source, runtime);
    }

    fn has_property(&self, name: &str) -> bool {
        self.has(name)
    }

    fn as_dict(&self) -> BTreeMap<String, PropertyValue> {
        PropertyStore::as_dict(self)
    }

    fn as_list(&self) -> Vec<PropertyEntry> {
        PropertyStore::as_list(self)
    }
}
