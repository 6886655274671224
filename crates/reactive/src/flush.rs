//! The flush engine.
//!
//! A flush takes the pending batch from the change tracker and, per kind,
//! re-evaluates the filtered and live arrays of that kind against the dirty
//! entities only. Hidden entities are collected across all kinds and detached
//! from every array still in their owning set at the end.
//!
//! Work happens in two phases. The compute phase reads entity snapshots,
//! invokes predicates and records a patch per array, then updates the
//! owning-set index under one state borrow. The apply phase releases the
//! borrow and patches the arrays, so subscribers may call back into the
//! manager (for instance to mark another entity changed).
//!
//! A subscriber may destroy an array or run a nested flush before a later
//! patch lands. After each patch the owning sets of its entities are
//! reconciled with the array's actual content.

use crate::array::{ArrayId, RecordArray};
use crate::manager::RecordArrayManager;
use crate::source::EntitySource;
use hashbrown::HashMap;
use trellis_core::{EntityId, EntityKey, Kind, Record};
use tracing::{debug, trace};

/// The state of one entity as seen by a flush.
pub(crate) struct EntitySnapshot {
    pub(crate) id: EntityId,
    pub(crate) hidden: bool,
    pub(crate) empty: bool,
    pub(crate) record: Option<Record>,
}

impl EntitySnapshot {
    pub(crate) fn read(source: &dyn EntitySource, kind: &Kind, id: EntityId, with_record: bool) -> Self {
        let hidden = source.is_hidden(kind, id);
        Self {
            id,
            hidden,
            empty: source.is_empty(kind, id),
            record: if with_record && !hidden { source.record(kind, id) } else { None },
        }
    }

    pub(crate) fn read_all(source: &dyn EntitySource, kind: &Kind, ids: &[EntityId], with_records: bool) -> Vec<Self> {
        ids.iter()
            .map(|&id| Self::read(source, kind, id, with_records))
            .collect()
    }

    /// Live arrays hold every visible entity with materialized data.
    #[inline]
    fn is_live(&self) -> bool {
        !self.hidden && !self.empty
    }
}

/// Pending additions and removals for one array.
pub(crate) struct ArrayPatch {
    array: RecordArray,
    added: Vec<EntityId>,
    removed: Vec<EntityId>,
}

/// Patches collected during a compute phase, one per touched array.
pub(crate) struct PatchSet {
    patches: Vec<ArrayPatch>,
    index: HashMap<ArrayId, usize>,
}

impl PatchSet {
    pub(crate) fn new() -> Self {
        Self {
            patches: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn entry(&mut self, array: &RecordArray) -> &mut ArrayPatch {
        let patches = &mut self.patches;
        let slot = *self.index.entry(array.id()).or_insert_with(|| {
            patches.push(ArrayPatch {
                array: array.clone(),
                added: Vec::new(),
                removed: Vec::new(),
            });
            patches.len() - 1
        });
        &mut self.patches[slot]
    }

    fn add(&mut self, array: &RecordArray, id: EntityId) {
        self.entry(array).added.push(id);
    }

    fn remove(&mut self, array: &RecordArray, id: EntityId) {
        self.entry(array).removed.push(id);
    }

    /// Visible entities matching the predicate join; members that stop
    /// matching or become hidden leave.
    pub(crate) fn evaluate_filtered(&mut self, array: &RecordArray, snapshots: &[EntitySnapshot]) {
        let Some(predicate) = array.predicate() else {
            trace!(array = array.id(), "filtered array without predicate skipped");
            return;
        };
        for snapshot in snapshots {
            let matches = !snapshot.hidden && snapshot.record.as_ref().map_or(false, |record| predicate(record));
            let member = array.contains(snapshot.id);
            if matches && !member {
                self.add(array, snapshot.id);
            } else if member && !matches {
                self.remove(array, snapshot.id);
            }
        }
    }

    /// Visible, non-empty entities join; members that no longer qualify
    /// leave.
    pub(crate) fn evaluate_live(&mut self, array: &RecordArray, snapshots: &[EntitySnapshot]) {
        for snapshot in snapshots {
            let member = array.contains(snapshot.id);
            if snapshot.is_live() && !member {
                self.add(array, snapshot.id);
            } else if member && !snapshot.is_live() {
                self.remove(array, snapshot.id);
            }
        }
    }

    fn len(&self) -> usize {
        self.patches.len()
    }
}

/// Summary of one flush pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of kinds with dirty entities
    pub kinds: usize,
    /// Number of dirty entities processed
    pub entities: usize,
    /// Ids added across all arrays
    pub added: usize,
    /// Ids removed across all arrays
    pub removed: usize,
    /// Arrays whose content changed
    pub arrays_touched: usize,
}

impl FlushReport {
    /// Returns true if the flush processed nothing.
    pub fn is_empty(&self) -> bool {
        self.entities == 0
    }
}

impl RecordArrayManager {
    /// Processes every entity marked since the last flush.
    ///
    /// Normally run by the scheduler at the end of the current unit of work.
    /// Calling it directly forces a synchronous pass; the scheduled task then
    /// finds nothing to do.
    pub fn flush(&self) -> FlushReport {
        let batch = {
            let mut state = self.state_mut();
            if state.destroyed {
                return FlushReport::default();
            }
            state.tracker.take_pending()
        };
        if batch.is_empty() {
            trace!("flush: nothing pending");
            return FlushReport::default();
        }

        let mut report = FlushReport {
            kinds: batch.len(),
            ..FlushReport::default()
        };
        let mut patches = PatchSet::new();
        let mut hidden = Vec::new();

        for (kind, ids) in &batch {
            report.entities += ids.len();
            let (filtered, live) = {
                let state = self.state();
                (state.registry.filtered_arrays_for(kind), state.registry.live_arrays_for(kind))
            };
            let snapshots = EntitySnapshot::read_all(self.source(), kind, ids, !filtered.is_empty());

            for array in &filtered {
                patches.evaluate_filtered(array, &snapshots);
            }
            for array in &live {
                patches.evaluate_live(array, &snapshots);
            }
            hidden.extend(
                snapshots
                    .iter()
                    .filter(|snapshot| snapshot.hidden)
                    .map(|snapshot| EntityKey::new(kind.clone(), snapshot.id)),
            );
        }

        let patched = patches.len();
        let (added, removed, touched) = self.commit(patches, hidden);
        report.added = added;
        report.removed = removed;
        report.arrays_touched = touched;

        if self.config().trace_flushes {
            debug!(
                kinds = report.kinds,
                entities = report.entities,
                patched,
                added,
                removed,
                "flushed record arrays"
            );
        }
        report
    }

    /// Updates the owning-set index for `patches`, detaches `hidden`
    /// entities from every remaining owner, then applies the patches.
    ///
    /// Returns (added, removed, arrays touched).
    pub(crate) fn commit(&self, mut patches: PatchSet, hidden: Vec<EntityKey>) -> (usize, usize, usize) {
        {
            let mut state = self.state_mut();
            for patch in &patches.patches {
                let kind = patch.array.kind();
                for &id in &patch.added {
                    state.membership.associate(&EntityKey::new(kind.clone(), id), &patch.array);
                }
                for &id in &patch.removed {
                    state.membership.dissociate(&EntityKey::new(kind.clone(), id), patch.array.id());
                }
            }
            for key in &hidden {
                for owner in state.membership.take(key) {
                    patches.remove(&owner, key.id);
                }
            }
        }

        let (mut added, mut removed, mut touched) = (0, 0, 0);
        for patch in patches.patches {
            let pushed = if patch.added.is_empty() { 0 } else { patch.array.push_entities(&patch.added) };
            let mut dropped = if patch.removed.is_empty() { 0 } else { patch.array.remove_entities(&patch.removed) };
            dropped += self.reconcile(&patch);
            added += pushed;
            removed += dropped;
            if pushed + dropped > 0 {
                touched += 1;
            }
        }
        (added, removed, touched)
    }

    /// Brings the owning sets of a patch's entities back in line with the
    /// array after the patch was applied.
    ///
    /// An entity listed for an array that no longer holds it (the array was
    /// destroyed, or a nested pass removed it) is dissociated. An entity the
    /// array holds without being listed was detached by a nested pass after
    /// this patch was computed, so it is removed from the array.
    ///
    /// Returns the number of entities removed.
    fn reconcile(&self, patch: &ArrayPatch) -> usize {
        let array = &patch.array;
        let stale: Vec<EntityId> = {
            let mut state = self.state_mut();
            let mut stale = Vec::new();
            for &id in patch.added.iter().chain(&patch.removed) {
                let key = EntityKey::new(array.kind().clone(), id);
                let listed = state.membership.contains(&key, array.id());
                let held = array.contains(id);
                if listed && !held {
                    state.membership.dissociate(&key, array.id());
                } else if held && !listed {
                    stale.push(id);
                }
            }
            stale
        };
        if stale.is_empty() {
            return 0;
        }
        trace!(array = array.id(), count = stale.len(), "removing entities detached mid-flush");
        array.remove_entities(&stale)
    }
}
