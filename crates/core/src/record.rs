//! Materialized records.
//!
//! A `Record` is the read-only view of an entity that filter predicates see:
//! an id, a version, and named attribute values.

use crate::value::Value;
use alloc::collections::BTreeMap;
use alloc::string::String;

/// Identifier of an entity within its kind.
pub type EntityId = u64;

/// A materialized entity.
#[derive(Clone, Debug, Default)]
pub struct Record {
    /// Identifier of this record within its kind.
    id: EntityId,
    /// Version number for change detection. Incremented on each update.
    version: u64,
    /// Attribute values by name.
    attributes: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record with the given ID.
    /// Version defaults to 1 for new records.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            version: 1,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the record ID.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Increments the version number and returns the new value.
    #[inline]
    pub fn increment_version(&mut self) -> u64 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    /// Gets an attribute value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Sets an attribute value, returning the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Iterates over attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges the attributes of `other` into this record and bumps the version.
    ///
    /// Attributes missing from `other` are kept.
    pub fn merge(&mut self, other: Record) {
        self.attributes.extend(other.attributes);
        self.increment_version();
    }

    /// Returns the number of attributes.
    #[inline]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if this record has no attributes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new() {
        let record = Record::new(1).with("name", "Tom Dale").with("age", 40i64);
        assert_eq!(record.id(), 1);
        assert_eq!(record.version(), 1);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("age").and_then(Value::as_i64), Some(40));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_record_merge_keeps_missing() {
        let mut record = Record::new(1).with("name", "Tom Dale").with("description", "thinkfluencer");
        record.merge(Record::new(1).with("name", "Yehuda Katz"));

        assert_eq!(record.get("name").and_then(Value::as_str), Some("Yehuda Katz"));
        assert_eq!(record.get("description").and_then(Value::as_str), Some("thinkfluencer"));
        assert_eq!(record.version(), 2);
    }

    #[test]
    fn test_record_equality_ignores_version() {
        let a = Record::new(1).with("age", 20i64);
        let mut b = a.clone();
        b.increment_version();
        assert_eq!(a, b);
        assert_ne!(a, Record::new(2).with("age", 20i64));
    }
}
