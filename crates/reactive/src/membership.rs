//! Owning-set index.
//!
//! For every entity, the set of record arrays that currently contain it.
//! The index is a back-reference: it records membership and never owns the
//! entities. Keeping it outside the entity avoids reference cycles between
//! entities and arrays.

use crate::array::{ArrayId, RecordArray};
use hashbrown::HashMap;
use trellis_core::EntityKey;

/// Maps each entity to the arrays that contain it.
#[derive(Default)]
pub struct MembershipIndex {
    owners: HashMap<EntityKey, HashMap<ArrayId, RecordArray>>,
}

impl MembershipIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `array` contains `key`.
    ///
    /// Returns true if the association is new.
    pub fn associate(&mut self, key: &EntityKey, array: &RecordArray) -> bool {
        let owners = self.owners.entry(key.clone()).or_default();
        if owners.contains_key(&array.id()) {
            return false;
        }
        owners.insert(array.id(), array.clone());
        true
    }

    /// Removes the association between `key` and an array.
    ///
    /// Returns true if it existed.
    pub fn dissociate(&mut self, key: &EntityKey, array: ArrayId) -> bool {
        let Some(owners) = self.owners.get_mut(key) else {
            return false;
        };
        let removed = owners.remove(&array).is_some();
        if owners.is_empty() {
            self.owners.remove(key);
        }
        removed
    }

    /// Checks whether `array` contains `key`.
    pub fn contains(&self, key: &EntityKey, array: ArrayId) -> bool {
        self.owners
            .get(key)
            .map_or(false, |owners| owners.contains_key(&array))
    }

    /// Returns the arrays that contain `key`.
    pub fn owners(&self, key: &EntityKey) -> Vec<RecordArray> {
        self.owners
            .get(key)
            .map(|owners| owners.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Clears the owning set of `key` and returns the arrays it held.
    pub fn take(&mut self, key: &EntityKey) -> Vec<RecordArray> {
        self.owners
            .remove(key)
            .map(|owners| owners.into_values().collect())
            .unwrap_or_default()
    }

    /// Returns the number of entities with a non-empty owning set.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Clears the index and returns every distinct array it referenced.
    pub fn drain_arrays(&mut self) -> Vec<RecordArray> {
        let mut arrays: HashMap<ArrayId, RecordArray> = HashMap::new();
        for (_, owners) in self.owners.drain() {
            arrays.extend(owners);
        }
        arrays.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Kind;

    fn person(id: u64) -> EntityKey {
        EntityKey::new(Kind::new("person").unwrap(), id)
    }

    fn live(id: ArrayId) -> RecordArray {
        let kind = Kind::new("person").unwrap();
        RecordArray::new_live(id, kind.clone(), kind, vec![], false)
    }

    #[test]
    fn test_associate_is_idempotent() {
        let mut index = MembershipIndex::new();
        let array = live(1);

        assert!(index.associate(&person(1), &array));
        assert!(!index.associate(&person(1), &array));
        assert!(index.contains(&person(1), 1));
        assert_eq!(index.owners(&person(1)).len(), 1);
    }

    #[test]
    fn test_dissociate() {
        let mut index = MembershipIndex::new();
        let array = live(1);

        index.associate(&person(1), &array);
        assert!(index.dissociate(&person(1), 1));
        assert!(!index.dissociate(&person(1), 1));
        assert!(!index.contains(&person(1), 1));
        assert!(index.is_empty());
    }

    #[test]
    fn test_take_clears_owning_set() {
        let mut index = MembershipIndex::new();
        index.associate(&person(1), &live(1));
        index.associate(&person(1), &live(2));
        index.associate(&person(2), &live(2));

        let taken = index.take(&person(1));
        assert_eq!(taken.len(), 2);
        assert!(index.owners(&person(1)).is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_drain_arrays_distinct() {
        let mut index = MembershipIndex::new();
        let shared = live(1);
        index.associate(&person(1), &shared);
        index.associate(&person(2), &shared);
        index.associate(&person(2), &live(2));

        assert_eq!(index.drain_arrays().len(), 2);
        assert!(index.is_empty());
    }
}
