//! Array registry.
//!
//! This module provides `ArrayRegistry`, which indexes the record arrays a
//! manager keeps up to date so that a flush of one kind only visits the
//! arrays that depend on it.

use crate::array::{ArrayVariant, RecordArray};
use hashbrown::HashMap;
use trellis_core::Kind;

/// Indexes live, filtered and populated arrays.
///
/// - live arrays: storage kind -> exposed kind -> array (at most one each)
/// - filtered arrays: storage kind -> arrays, in registration order
/// - populated arrays: one flat list, since they do not follow a kind
#[derive(Default)]
pub struct ArrayRegistry {
    live: HashMap<Kind, HashMap<Kind, RecordArray>>,
    filtered: HashMap<Kind, Vec<RecordArray>>,
    populated: Vec<RecordArray>,
}

impl ArrayRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live array under its kind and exposed kind.
    ///
    /// Returns the array previously registered for that pair, if any.
    pub fn register_live(&mut self, array: RecordArray) -> Option<RecordArray> {
        self.live
            .entry(array.kind().clone())
            .or_default()
            .insert(array.exposed_kind().clone(), array)
    }

    /// Registers a filtered array for a kind.
    pub fn register_filtered(&mut self, kind: &Kind, array: RecordArray) {
        self.filtered.entry(kind.clone()).or_default().push(array);
    }

    /// Registers a populated array.
    pub fn register_populated(&mut self, array: RecordArray) {
        self.populated.push(array);
    }

    /// Returns the live array for a (kind, exposed kind) pair.
    pub fn live(&self, kind: &Kind, exposed_kind: &Kind) -> Option<&RecordArray> {
        self.live.get(kind).and_then(|arrays| arrays.get(exposed_kind))
    }

    /// Returns every live array of a storage kind.
    pub fn live_arrays_for(&self, kind: &Kind) -> Vec<RecordArray> {
        self.live
            .get(kind)
            .map(|arrays| arrays.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the filtered arrays of a kind, in registration order.
    pub fn filtered_arrays_for(&self, kind: &Kind) -> Vec<RecordArray> {
        self.filtered.get(kind).cloned().unwrap_or_default()
    }

    /// Returns the populated arrays.
    pub fn populated_arrays(&self) -> &[RecordArray] {
        &self.populated
    }

    /// Unregisters an array so it no longer receives updates.
    ///
    /// Returns true if the array was registered.
    pub fn unregister(&mut self, array: &RecordArray) -> bool {
        match array.variant() {
            ArrayVariant::Filtered => {
                let Some(arrays) = self.filtered.get_mut(array.kind()) else {
                    return false;
                };
                let removed = remove(arrays, array);
                if arrays.is_empty() {
                    self.filtered.remove(array.kind());
                }
                removed
            }
            ArrayVariant::Populated => remove(&mut self.populated, array),
            ArrayVariant::Live => {
                let Some(arrays) = self.live.get_mut(array.kind()) else {
                    return false;
                };
                // Only the registered instance may unregister its slot
                let registered = arrays
                    .get(array.exposed_kind())
                    .map_or(false, |current| current.ptr_eq(array));
                if registered {
                    arrays.remove(array.exposed_kind());
                    if arrays.is_empty() {
                        self.live.remove(array.kind());
                    }
                }
                registered
            }
        }
    }

    /// Returns every registered array.
    pub fn arrays(&self) -> Vec<RecordArray> {
        let mut all: Vec<RecordArray> = self.live.values().flat_map(|a| a.values().cloned()).collect();
        all.extend(self.filtered.values().flat_map(|a| a.iter().cloned()));
        all.extend(self.populated.iter().cloned());
        all
    }

    /// Returns the number of registered arrays.
    pub fn len(&self) -> usize {
        self.live.values().map(|a| a.len()).sum::<usize>()
            + self.filtered.values().map(|a| a.len()).sum::<usize>()
            + self.populated.len()
    }

    /// Returns true if no array is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every array and returns them.
    pub fn drain(&mut self) -> Vec<RecordArray> {
        let all = self.arrays();
        self.live.clear();
        self.filtered.clear();
        self.populated.clear();
        all
    }
}

fn remove(arrays: &mut Vec<RecordArray>, array: &RecordArray) -> bool {
    match arrays.iter().position(|a| a.ptr_eq(array)) {
        Some(index) => {
            arrays.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use trellis_core::Record;

    fn kind(name: &str) -> Kind {
        Kind::new(name).unwrap()
    }

    fn filtered(id: u64, name: &str) -> RecordArray {
        RecordArray::new_filtered(id, kind(name), Rc::new(|_: &Record| true), None)
    }

    #[test]
    fn test_registry_new() {
        let registry = ArrayRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_live_per_exposed_kind() {
        let mut registry = ArrayRegistry::new();
        let person = RecordArray::new_live(1, kind("person"), kind("person"), vec![], false);
        let compact = RecordArray::new_live(2, kind("person"), kind("compact-person"), vec![], false);

        assert!(registry.register_live(person.clone()).is_none());
        assert!(registry.register_live(compact.clone()).is_none());

        assert!(registry.live(&kind("person"), &kind("person")).unwrap().ptr_eq(&person));
        assert!(registry.live(&kind("person"), &kind("compact-person")).unwrap().ptr_eq(&compact));
        assert_eq!(registry.live_arrays_for(&kind("person")).len(), 2);
        assert!(registry.live_arrays_for(&kind("dog")).is_empty());
    }

    #[test]
    fn test_registry_filtered_order() {
        let mut registry = ArrayRegistry::new();
        let a = filtered(1, "person");
        let b = filtered(2, "person");
        let c = filtered(3, "dog");

        registry.register_filtered(&kind("person"), a.clone());
        registry.register_filtered(&kind("person"), b.clone());
        registry.register_filtered(&kind("dog"), c);

        let arrays = registry.filtered_arrays_for(&kind("person"));
        assert_eq!(arrays.len(), 2);
        assert!(arrays[0].ptr_eq(&a));
        assert!(arrays[1].ptr_eq(&b));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry = ArrayRegistry::new();
        let live = RecordArray::new_live(1, kind("person"), kind("person"), vec![], false);
        let filter = filtered(2, "person");
        let populated = RecordArray::new_populated(3, kind("person"), None, None);

        registry.register_live(live.clone());
        registry.register_filtered(&kind("person"), filter.clone());
        registry.register_populated(populated.clone());

        assert!(registry.unregister(&filter));
        assert!(!registry.unregister(&filter)); // Already removed
        assert!(registry.unregister(&populated));
        assert!(registry.unregister(&live));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_unregister_stale_live() {
        let mut registry = ArrayRegistry::new();
        let old = RecordArray::new_live(1, kind("person"), kind("person"), vec![], false);
        let new = RecordArray::new_live(2, kind("person"), kind("person"), vec![], false);

        registry.register_live(old.clone());
        assert!(registry.register_live(new.clone()).unwrap().ptr_eq(&old));

        // The replaced instance does not evict the current one
        assert!(!registry.unregister(&old));
        assert!(registry.live(&kind("person"), &kind("person")).unwrap().ptr_eq(&new));
    }

    #[test]
    fn test_registry_drain() {
        let mut registry = ArrayRegistry::new();
        registry.register_live(RecordArray::new_live(1, kind("person"), kind("person"), vec![], false));
        registry.register_filtered(&kind("person"), filtered(2, "person"));
        registry.register_populated(RecordArray::new_populated(3, kind("person"), None, None));

        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
        assert!(registry.populated_arrays().is_empty());
    }
}
