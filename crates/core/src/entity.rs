//! Entity identity and lifecycle state.

use crate::kind::Kind;
use crate::record::EntityId;
use core::fmt;

/// Globally unique entity identity: its kind plus its id within the kind.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: Kind,
    pub id: EntityId,
}

impl EntityKey {
    #[inline]
    pub fn new(kind: Kind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle state of a cached entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Known by id only; no data materialized.
    #[default]
    Empty,
    /// A load is in progress; data may be partial.
    Loading,
    /// Fully loaded and usable.
    Loaded,
    /// Deleted and the deletion has been persisted.
    Deleted,
    /// Removed from the cache.
    Unloaded,
}

impl EntityState {
    /// Hidden entities are never members of live or filtered arrays.
    #[inline]
    pub fn is_hidden(self) -> bool {
        matches!(self, EntityState::Empty | EntityState::Deleted | EntityState::Unloaded)
    }

    /// Empty entities have no usable data yet.
    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, EntityState::Empty | EntityState::Loading)
    }
}
