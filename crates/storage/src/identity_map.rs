//! Identity map for cached entities.
//!
//! This module provides the `IdentityMap` struct which keeps one table of
//! entities per kind. Each entity pairs its materialized `Record` with the
//! lifecycle `EntityState` that decides whether derived arrays may hold it.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use trellis_core::{EntityId, EntityState, Error, Kind, Record, Result};

/// A cached entity.
#[derive(Clone, Debug)]
pub struct Entity {
    record: Record,
    state: EntityState,
}

impl Entity {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn state(&self) -> EntityState {
        self.state
    }
}

/// Outcome of writing a record into the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// The entity was unknown or had no data yet.
    FirstLoad,
    /// The entity had data and was updated in place.
    Updated,
}

/// The entities of one kind, ordered by id.
#[derive(Default)]
pub(crate) struct EntityTable {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityTable {
    fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.entities.len()
    }
}

/// Cache of entity tables keyed by kind.
#[derive(Default)]
pub struct IdentityMap {
    tables: HashMap<Kind, EntityTable>,
}

impl IdentityMap {
    /// Creates a new empty identity map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an entity.
    pub fn get(&self, kind: &Kind, id: EntityId) -> Option<&Entity> {
        self.tables.get(kind).and_then(|t| t.get(id))
    }

    /// Returns the state of an entity, if tracked.
    pub fn state(&self, kind: &Kind, id: EntityId) -> Option<EntityState> {
        self.get(kind, id).map(Entity::state)
    }

    /// Writes a record, merging it into an existing entity, and marks the
    /// entity loaded.
    pub fn upsert(&mut self, kind: &Kind, record: Record) -> Upsert {
        let table = self.tables.entry(kind.clone()).or_default();
        match table.entities.get_mut(&record.id()) {
            Some(entity) => {
                let first = entity.state.is_empty() || entity.state.is_hidden();
                entity.record.merge(record);
                entity.state = EntityState::Loaded;
                if first {
                    Upsert::FirstLoad
                } else {
                    Upsert::Updated
                }
            }
            None => {
                table.entities.insert(
                    record.id(),
                    Entity {
                        record,
                        state: EntityState::Loaded,
                    },
                );
                Upsert::FirstLoad
            }
        }
    }

    /// Tracks an entity without data. Returns false if it was already
    /// tracked.
    pub fn reserve(&mut self, kind: &Kind, id: EntityId) -> bool {
        let table = self.tables.entry(kind.clone()).or_default();
        if table.entities.contains_key(&id) {
            return false;
        }
        table.entities.insert(
            id,
            Entity {
                record: Record::new(id),
                state: EntityState::Empty,
            },
        );
        true
    }

    /// Moves a tracked entity to a new lifecycle state.
    pub fn set_state(&mut self, kind: &Kind, id: EntityId, state: EntityState) -> Result<EntityState> {
        let entity = self
            .tables
            .get_mut(kind)
            .and_then(|t| t.entities.get_mut(&id))
            .ok_or_else(|| Error::not_found(kind.clone(), id))?;
        let previous = entity.state;
        entity.state = state;
        Ok(previous)
    }

    /// Returns the ids of a kind, hidden entities included.
    pub fn ids(&self, kind: &Kind) -> Vec<EntityId> {
        self.tables.get(kind).map(EntityTable::ids).unwrap_or_default()
    }

    /// Returns the number of tracked entities of a kind.
    pub fn count(&self, kind: &Kind) -> usize {
        self.tables.get(kind).map_or(0, EntityTable::len)
    }

    /// Returns the number of kinds with a table.
    pub fn kind_count(&self) -> usize {
        self.tables.len()
    }

    /// Returns the total entity count across all kinds.
    pub fn total_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    /// Drops every table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
