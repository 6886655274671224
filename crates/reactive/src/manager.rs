//! The record-array manager.
//!
//! `RecordArrayManager` owns every derived array of a store together with the
//! bookkeeping that keeps them current: the array registry, the owning-set
//! index and the change tracker. Storage reports entity changes with
//! `mark_changed`; the first mark of a cycle schedules one deferred `flush`
//! on the injected `Scheduler`.
//!
//! The manager is a cheap-clone handle. Scheduled tasks and refresh
//! completions hold a `WeakManager` so they never keep a dropped manager
//! alive.

use crate::array::{ArrayId, ArrayVariant, Document, Predicate, QueryResult, RecordArray};
use crate::config::ManagerConfig;
use crate::flush::{EntitySnapshot, PatchSet};
use crate::membership::MembershipIndex;
use crate::refresh::RefreshHandle;
use crate::registry::ArrayRegistry;
use crate::scheduler::Scheduler;
use crate::source::EntitySource;
use crate::tracker::{ChangeTracker, Mark};
use hashbrown::{HashMap, HashSet};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use trellis_core::{EntityId, EntityKey, Error, Kind, Result};
use tracing::{debug, trace};

pub(crate) struct ManagerState {
    pub(crate) tracker: ChangeTracker,
    pub(crate) registry: ArrayRegistry,
    pub(crate) membership: MembershipIndex,
    pub(crate) in_flight: HashMap<Kind, RefreshHandle>,
    next_array_id: ArrayId,
    pub(crate) destroyed: bool,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            tracker: ChangeTracker::new(),
            registry: ArrayRegistry::new(),
            membership: MembershipIndex::new(),
            in_flight: HashMap::new(),
            next_array_id: 1,
            destroyed: false,
        }
    }

    fn allocate_id(&mut self) -> ArrayId {
        let id = self.next_array_id;
        self.next_array_id += 1;
        id
    }
}

pub(crate) struct ManagerInner {
    pub(crate) source: Rc<dyn EntitySource>,
    scheduler: Rc<dyn Scheduler>,
    pub(crate) config: ManagerConfig,
    state: RefCell<ManagerState>,
}

/// Keeps live, filtered and populated record arrays in sync with an
/// `EntitySource`.
#[derive(Clone)]
pub struct RecordArrayManager {
    pub(crate) inner: Rc<ManagerInner>,
}

/// A weak handle to a `RecordArrayManager`.
#[derive(Clone)]
pub struct WeakManager {
    inner: Weak<ManagerInner>,
}

impl WeakManager {
    /// Returns a strong handle if the manager is still alive.
    pub fn upgrade(&self) -> Option<RecordArrayManager> {
        self.inner.upgrade().map(|inner| RecordArrayManager { inner })
    }
}

impl RecordArrayManager {
    /// Creates a manager with the default configuration.
    pub fn new(source: Rc<dyn EntitySource>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_config(source, scheduler, ManagerConfig::default())
    }

    /// Creates a manager with a custom configuration.
    pub fn with_config(source: Rc<dyn EntitySource>, scheduler: Rc<dyn Scheduler>, config: ManagerConfig) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                source,
                scheduler,
                config,
                state: RefCell::new(ManagerState::new()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, ManagerState> {
        self.inner.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, ManagerState> {
        self.inner.state.borrow_mut()
    }

    pub(crate) fn source(&self) -> &dyn EntitySource {
        &*self.inner.source
    }

    pub(crate) fn scheduler(&self) -> &dyn Scheduler {
        &*self.inner.scheduler
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::destroyed("record array manager"))
        } else {
            Ok(())
        }
    }

    // ========== Change tracking ==========

    /// Reports that an entity changed. The entity is processed by the next
    /// flush; re-marking it before then is a no-op.
    pub fn mark_changed(&self, key: &EntityKey) {
        self.mark(key);
    }

    /// Reports that an entity finished its first load.
    pub fn mark_first_load(&self, key: &EntityKey) {
        self.mark(key);
    }

    fn mark(&self, key: &EntityKey) {
        let mark = {
            let mut state = self.state_mut();
            if state.destroyed {
                trace!(entity = %key, "mark on destroyed manager ignored");
                return;
            }
            state.tracker.mark(key)
        };
        match mark {
            Mark::Duplicate => trace!(entity = %key, "entity already pending"),
            Mark::Queued => {}
            Mark::ScheduleFlush => self.schedule_flush(),
        }
    }

    fn schedule_flush(&self) {
        let weak = self.downgrade();
        self.inner.scheduler.schedule(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.flush();
            }
        }));
    }

    /// Returns true if a mark is waiting for the next flush.
    pub fn has_pending(&self) -> bool {
        self.state().tracker.has_pending()
    }

    // ========== Live arrays ==========

    /// Returns the live array of `kind` exposed as `exposed_kind`, creating
    /// it on first request.
    ///
    /// An existing array is re-synchronized against the source first.
    pub fn live_array(&self, kind: &Kind, exposed_kind: &Kind) -> Result<RecordArray> {
        self.ensure_alive()?;
        let existing = self.state().registry.live(kind, exposed_kind).cloned();
        match existing {
            Some(array) => {
                self.sync_live_array(&array);
                Ok(array)
            }
            None => self.create_live_array(kind, exposed_kind),
        }
    }

    /// Returns the live array of `kind` exposed under its own name.
    pub fn live_array_for(&self, kind: &Kind) -> Result<RecordArray> {
        self.live_array(kind, kind)
    }

    /// Builds and registers a live array with its content precomputed from
    /// the visible, non-empty entities of `kind`. Construction emits no
    /// change events.
    pub fn create_live_array(&self, kind: &Kind, exposed_kind: &Kind) -> Result<RecordArray> {
        self.ensure_alive()?;
        let source = self.source();
        let content: Vec<EntityId> = source
            .entity_ids(kind)
            .into_iter()
            .filter(|&id| !source.is_hidden(kind, id) && !source.is_empty(kind, id))
            .collect();

        let mut state = self.state_mut();
        let id = state.allocate_id();
        let updating = state.in_flight.contains_key(kind);
        let array = RecordArray::new_live(id, kind.clone(), exposed_kind.clone(), content, updating);
        for entity in array.content() {
            state.membership.associate(&EntityKey::new(kind.clone(), entity), &array);
        }
        if let Some(previous) = state.registry.register_live(array.clone()) {
            trace!(kind = %kind, exposed = %exposed_kind, replaced = previous.id(), "live array replaced");
        }
        trace!(kind = %kind, exposed = %exposed_kind, array = id, len = array.len(), "live array created");
        Ok(array)
    }

    /// Registers an existing live array under its kind and exposed kind.
    ///
    /// Returns the array previously registered for that pair, if any.
    pub fn register_live_array(&self, array: &RecordArray) -> Result<Option<RecordArray>> {
        self.ensure_alive()?;
        expect_variant(array, ArrayVariant::Live, "register_live_array")?;
        if array.is_destroyed() {
            return Err(Error::destroyed("record array"));
        }
        let previous = self.state_mut().registry.register_live(array.clone());
        self.sync_live_array(array);
        Ok(previous)
    }

    fn sync_live_array(&self, array: &RecordArray) {
        let kind = array.kind();
        if self.config().live_sync.allows_shortcut() {
            let pending = self.has_pending();
            if !pending && self.source().entity_count(kind) == array.len() {
                trace!(kind = %kind, array = array.id(), "live array in sync");
                return;
            }
        }
        let ids = self.source().entity_ids(kind);
        let snapshots = EntitySnapshot::read_all(self.source(), kind, &ids, false);
        let mut patches = PatchSet::new();
        patches.evaluate_live(array, &snapshots);
        self.commit(patches, Vec::new());
    }

    // ========== Filtered arrays ==========

    /// Creates and registers a filtered array, evaluated synchronously
    /// against every tracked entity of `kind`.
    pub fn create_filtered_array(
        &self,
        kind: &Kind,
        predicate: Predicate,
        query: Option<Document>,
    ) -> Result<RecordArray> {
        self.ensure_alive()?;
        let id = self.state_mut().allocate_id();
        let array = RecordArray::new_filtered(id, kind.clone(), predicate.clone(), query);
        self.register_filtered_array(&array, kind, predicate)?;
        Ok(array)
    }

    /// Registers a filtered array for `kind` and runs a full evaluation.
    pub fn register_filtered_array(&self, array: &RecordArray, kind: &Kind, predicate: Predicate) -> Result<()> {
        self.ensure_alive()?;
        expect_filtered(array, kind, "register_filtered_array")?;
        array.set_predicate(predicate);
        {
            let mut state = self.state_mut();
            let registered = state
                .registry
                .filtered_arrays_for(kind)
                .iter()
                .any(|a| a.ptr_eq(array));
            if !registered {
                state.registry.register_filtered(kind, array.clone());
            }
        }
        self.evaluate_filtered_array(array, kind);
        Ok(())
    }

    /// Replaces the predicate of a filtered array and re-evaluates it
    /// against every tracked entity of `kind`.
    pub fn update_filter(&self, array: &RecordArray, kind: &Kind, predicate: Predicate) -> Result<()> {
        self.ensure_alive()?;
        expect_filtered(array, kind, "update_filter")?;
        array.set_predicate(predicate);
        self.evaluate_filtered_array(array, kind);
        Ok(())
    }

    /// Returns the filtered arrays registered for `kind`, in registration
    /// order.
    pub fn filtered_arrays_for(&self, kind: &Kind) -> Vec<RecordArray> {
        self.state().registry.filtered_arrays_for(kind)
    }

    fn evaluate_filtered_array(&self, array: &RecordArray, kind: &Kind) {
        let ids = self.source().entity_ids(kind);
        let snapshots = EntitySnapshot::read_all(self.source(), kind, &ids, true);
        let mut patches = PatchSet::new();
        patches.evaluate_filtered(array, &snapshots);
        self.commit(patches, Vec::new());
    }

    // ========== Populated arrays ==========

    /// Creates and registers an externally-populated array.
    ///
    /// With a result, the array is loaded immediately. Without one it starts
    /// empty and unloaded until `load_populated_array` fills it.
    pub fn create_populated_array(
        &self,
        kind: &Kind,
        query: Option<Document>,
        result: Option<QueryResult>,
    ) -> Result<RecordArray> {
        self.ensure_alive()?;
        let mut state = self.state_mut();
        let id = state.allocate_id();
        let array = RecordArray::new_populated(id, kind.clone(), query, result);
        for entity in array.content() {
            state.membership.associate(&EntityKey::new(kind.clone(), entity), &array);
        }
        state.registry.register_populated(array.clone());
        Ok(array)
    }

    /// Replaces the content of a populated array with a query result.
    pub fn load_populated_array(&self, array: &RecordArray, result: QueryResult) -> Result<()> {
        self.ensure_alive()?;
        expect_variant(array, ArrayVariant::Populated, "load_populated_array")?;
        if array.is_destroyed() {
            return Err(Error::destroyed("record array"));
        }
        {
            let mut seen = HashSet::with_capacity(result.ids.len());
            let next: Vec<EntityId> = result.ids.iter().copied().filter(|id| seen.insert(*id)).collect();
            let kind = array.kind();
            let mut state = self.state_mut();
            for previous in array.content() {
                if !seen.contains(&previous) {
                    state.membership.dissociate(&EntityKey::new(kind.clone(), previous), array.id());
                }
            }
            for entity in next {
                state.membership.associate(&EntityKey::new(kind.clone(), entity), array);
            }
        }
        // Subscribers run after the index is consistent again
        array.load(result);
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Stops keeping an array up to date. Its content is left untouched.
    ///
    /// Returns true if the array was registered.
    pub fn unregister_array(&self, array: &RecordArray) -> bool {
        self.state_mut().registry.unregister(array)
    }

    /// Unregisters an array, disassociates its members and destroys it.
    pub fn destroy_array(&self, array: &RecordArray) {
        self.unregister_array(array);
        let kind = array.kind().clone();
        let content = array.destroy();
        let mut state = self.state_mut();
        for entity in content {
            state.membership.dissociate(&EntityKey::new(kind.clone(), entity), array.id());
        }
    }

    /// Tears down every array and all bookkeeping. Later marks are ignored
    /// and later array requests fail with `Error::Destroyed`.
    pub fn destroy(&self) {
        let arrays = {
            let mut state = self.state_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.tracker.clear();
            state.in_flight.clear();
            let mut arrays = state.registry.drain();
            arrays.extend(state.membership.drain_arrays());
            arrays
        };
        let mut seen = HashSet::new();
        let mut count = 0;
        for array in arrays {
            if seen.insert(array.id()) {
                array.destroy();
                count += 1;
            }
        }
        debug!(arrays = count, "record array manager destroyed");
    }

    // ========== Introspection ==========

    /// Returns the arrays whose content includes `key`.
    pub fn owners(&self, key: &EntityKey) -> Vec<RecordArray> {
        self.state().membership.owners(key)
    }

    /// Returns the number of registered arrays.
    pub fn array_count(&self) -> usize {
        self.state().registry.len()
    }
}

impl fmt::Debug for RecordArrayManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RecordArrayManager")
            .field("arrays", &state.registry.len())
            .field("pending", &state.tracker.pending_len())
            .field("refreshing", &state.in_flight.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

fn expect_variant(array: &RecordArray, variant: ArrayVariant, operation: &str) -> Result<()> {
    if array.variant() == variant {
        Ok(())
    } else {
        Err(Error::invalid_operation(format!(
            "{operation} expects a {variant:?} array, got {:?}",
            array.variant()
        )))
    }
}

fn expect_filtered(array: &RecordArray, kind: &Kind, operation: &str) -> Result<()> {
    expect_variant(array, ArrayVariant::Filtered, operation)?;
    if array.kind() != kind {
        return Err(Error::invalid_operation(format!(
            "{operation}: array tracks {}, not {kind}",
            array.kind()
        )));
    }
    if array.is_destroyed() {
        return Err(Error::destroyed("record array"));
    }
    Ok(())
}
