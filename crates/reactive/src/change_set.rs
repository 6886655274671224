//! Change sets emitted by record arrays.
//!
//! An `ArrayChange` is the minimal delta one bulk mutation applied to a
//! record array: the ids that entered and the ids that left.

use trellis_core::EntityId;

/// A set of membership changes to a record array.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayChange {
    /// Ids that were added, in insertion order
    pub added: Vec<EntityId>,
    /// Ids that were removed
    pub removed: Vec<EntityId>,
}

impl ArrayChange {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set that only adds.
    pub fn added(ids: Vec<EntityId>) -> Self {
        Self {
            added: ids,
            removed: Vec::new(),
        }
    }

    /// Creates a change set that only removes.
    pub fn removed(ids: Vec<EntityId>) -> Self {
        Self {
            added: Vec::new(),
            removed: ids,
        }
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Merges another change set into this one.
    ///
    /// An id added by one side and removed by the other cancels out.
    pub fn merge(&mut self, other: ArrayChange) {
        for id in other.added {
            if let Some(pos) = self.removed.iter().position(|r| *r == id) {
                self.removed.swap_remove(pos);
            } else {
                self.added.push(id);
            }
        }
        for id in other.removed {
            if let Some(pos) = self.added.iter().position(|a| *a == id) {
                self.added.remove(pos);
            } else {
                self.removed.push(id);
            }
        }
    }
}
