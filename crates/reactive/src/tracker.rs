//! Entity change tracking.
//!
//! The tracker holds the dirty set of the current cycle: one pending list per
//! kind (insertion-ordered) plus a per-entity flag that makes re-marking an
//! entity within one cycle a no-op. It also owns the single "flush
//! scheduled" flag that coalesces a whole cycle into one deferred flush.

use hashbrown::{HashMap, HashSet};
use trellis_core::{EntityId, EntityKey, Kind};

/// Outcome of marking an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    /// Already pending in this cycle.
    Duplicate,
    /// Queued into an already scheduled cycle.
    Queued,
    /// First mark of an idle cycle; the caller must schedule a flush.
    ScheduleFlush,
}

/// Dirty entities accumulated since the last flush, by kind.
pub type PendingBatch = HashMap<Kind, Vec<EntityId>>;

#[derive(Default)]
pub struct ChangeTracker {
    pending: PendingBatch,
    flagged: HashSet<EntityKey>,
    flush_scheduled: bool,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an entity dirty for the current cycle.
    pub fn mark(&mut self, key: &EntityKey) -> Mark {
        if !self.flagged.insert(key.clone()) {
            return Mark::Duplicate;
        }
        self.pending.entry(key.kind.clone()).or_default().push(key.id);
        if self.flush_scheduled {
            Mark::Queued
        } else {
            self.flush_scheduled = true;
            Mark::ScheduleFlush
        }
    }

    /// Takes the pending batch and opens a new cycle.
    ///
    /// Per-entity flags are reset so that entities can be re-marked while the
    /// taken batch is being processed; such marks belong to the next cycle.
    pub fn take_pending(&mut self) -> PendingBatch {
        self.flush_scheduled = false;
        for (kind, ids) in &self.pending {
            for &id in ids {
                self.flagged.remove(&EntityKey::new(kind.clone(), id));
            }
        }
        std::mem::take(&mut self.pending)
    }

    /// Returns true if any entity of any kind is pending.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns the number of pending entities.
    pub fn pending_len(&self) -> usize {
        self.flagged.len()
    }

    /// Drops all pending work.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.flagged.clear();
        self.flush_scheduled = false;
    }
}
