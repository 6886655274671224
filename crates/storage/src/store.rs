//! The in-memory store.
//!
//! `MemoryStore` owns an identity map and the `RecordArrayManager` that
//! derives record arrays from it. Every write releases the map before
//! reporting the entity to the manager, so array subscribers may read the
//! store while a flush patches them.
//!
//! Ownership runs one way: the store holds the manager, the manager holds
//! the store's entity source, and the source reaches back to the manager
//! through a weak handle.

use crate::adapter::Adapter;
use crate::identity_map::{IdentityMap, Upsert};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};
use trellis_core::{EntityId, EntityKey, EntityState, Error, Kind, Record, Result};
use trellis_reactive::{
    Document, EntitySource, ManagerConfig, Predicate, RecordArray, RecordArrayManager, Scheduler, WeakManager,
};
use tracing::{debug, trace};

struct StoreInner {
    this: Weak<StoreInner>,
    map: RefCell<IdentityMap>,
    adapter: Rc<dyn Adapter>,
    manager: OnceCell<WeakManager>,
    destroyed: Cell<bool>,
}

impl StoreInner {
    fn manager(&self) -> Option<RecordArrayManager> {
        self.manager.get().and_then(WeakManager::upgrade)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.get() {
            Err(Error::destroyed("store"))
        } else {
            Ok(())
        }
    }

    fn push(&self, kind: &Kind, record: Record) -> Result<EntityKey> {
        self.ensure_alive()?;
        let key = EntityKey::new(kind.clone(), record.id());
        let outcome = self.map.borrow_mut().upsert(kind, record);
        trace!(entity = %key, ?outcome, "record pushed");
        if let Some(manager) = self.manager() {
            match outcome {
                Upsert::FirstLoad => manager.mark_first_load(&key),
                Upsert::Updated => manager.mark_changed(&key),
            }
        }
        Ok(key)
    }

    fn transition(&self, kind: &Kind, id: EntityId, state: EntityState) -> Result<()> {
        self.ensure_alive()?;
        let previous = self.map.borrow_mut().set_state(kind, id, state)?;
        let key = EntityKey::new(kind.clone(), id);
        trace!(entity = %key, ?previous, ?state, "entity state changed");
        if previous != state {
            if let Some(manager) = self.manager() {
                manager.mark_changed(&key);
            }
        }
        Ok(())
    }
}

impl EntitySource for StoreInner {
    fn entity_ids(&self, kind: &Kind) -> Vec<EntityId> {
        self.map.borrow().ids(kind)
    }

    fn entity_count(&self, kind: &Kind) -> usize {
        self.map.borrow().count(kind)
    }

    fn is_hidden(&self, kind: &Kind, id: EntityId) -> bool {
        self.map.borrow().state(kind, id).map_or(true, EntityState::is_hidden)
    }

    fn is_empty(&self, kind: &Kind, id: EntityId) -> bool {
        self.map.borrow().state(kind, id).map_or(true, EntityState::is_empty)
    }

    fn record(&self, kind: &Kind, id: EntityId) -> Option<Record> {
        self.map.borrow().get(kind, id).map(|entity| entity.record().clone())
    }

    fn reload_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<()>> {
        let request = self.adapter.find_all(kind);
        let this = self.this.clone();
        let kind = kind.clone();
        async move {
            let records = request.await?;
            let Some(store) = this.upgrade() else {
                trace!(kind = %kind, "reload finished after store drop");
                return Ok(());
            };
            let count = records.len();
            for record in records {
                store.push(&kind, record)?;
            }
            debug!(kind = %kind, count, "reloaded records");
            Ok(())
        }
        .boxed_local()
    }
}

/// An in-memory store whose record arrays stay in sync with its entities.
pub struct MemoryStore {
    inner: Rc<StoreInner>,
    manager: RecordArrayManager,
}

impl MemoryStore {
    /// Creates a store with the default manager configuration.
    pub fn new(adapter: Rc<dyn Adapter>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_config(adapter, scheduler, ManagerConfig::default())
    }

    /// Creates a store whose manager uses `config`.
    pub fn with_config(adapter: Rc<dyn Adapter>, scheduler: Rc<dyn Scheduler>, config: ManagerConfig) -> Self {
        let inner = Rc::new_cyclic(|this| StoreInner {
            this: this.clone(),
            map: RefCell::new(IdentityMap::new()),
            adapter,
            manager: OnceCell::new(),
            destroyed: Cell::new(false),
        });
        let manager = RecordArrayManager::with_config(inner.clone(), scheduler, config);
        // A fresh cell: the set cannot fail
        let _ = inner.manager.set(manager.downgrade());
        Self { inner, manager }
    }

    /// Returns the manager that owns this store's record arrays.
    pub fn manager(&self) -> &RecordArrayManager {
        &self.manager
    }

    // ========== Writes ==========

    /// Writes a record into the cache. New entities are reported as a first
    /// load, known ones as a change.
    pub fn push(&self, kind: &Kind, record: Record) -> Result<EntityKey> {
        self.inner.push(kind, record)
    }

    /// Writes several records of one kind.
    pub fn push_many(&self, kind: &Kind, records: impl IntoIterator<Item = Record>) -> Result<Vec<EntityKey>> {
        records.into_iter().map(|record| self.inner.push(kind, record)).collect()
    }

    /// Tracks an entity whose data has not been loaded yet.
    pub fn reserve(&self, kind: &Kind, id: EntityId) -> Result<EntityKey> {
        self.inner.ensure_alive()?;
        self.inner.map.borrow_mut().reserve(kind, id);
        Ok(EntityKey::new(kind.clone(), id))
    }

    /// Marks a reserved entity as loading.
    pub fn begin_loading(&self, kind: &Kind, id: EntityId) -> Result<()> {
        self.inner.transition(kind, id, EntityState::Loading)
    }

    /// Marks an entity deleted. It leaves every record array on the next
    /// flush but stays tracked.
    pub fn delete_record(&self, kind: &Kind, id: EntityId) -> Result<()> {
        self.inner.transition(kind, id, EntityState::Deleted)
    }

    /// Unloads an entity from the cache.
    pub fn unload_record(&self, kind: &Kind, id: EntityId) -> Result<()> {
        self.inner.transition(kind, id, EntityState::Unloaded)
    }

    // ========== Reads ==========

    /// Returns a visible entity's record without loading anything.
    pub fn peek_record(&self, kind: &Kind, id: EntityId) -> Option<Record> {
        let map = self.inner.map.borrow();
        let entity = map.get(kind, id)?;
        if entity.state().is_hidden() {
            None
        } else {
            Some(entity.record().clone())
        }
    }

    /// Returns the state of a tracked entity.
    pub fn entity_state(&self, kind: &Kind, id: EntityId) -> Option<EntityState> {
        self.inner.map.borrow().state(kind, id)
    }

    /// Returns the live array of every loaded entity of a kind, without
    /// contacting the adapter.
    pub fn peek_all(&self, kind: &Kind) -> Result<RecordArray> {
        self.inner.ensure_alive()?;
        self.manager.live_array_for(kind)
    }

    /// Returns a filtered array over the cached entities of a kind.
    pub fn filter(&self, kind: &Kind, predicate: Predicate, query: Option<Document>) -> Result<RecordArray> {
        self.inner.ensure_alive()?;
        self.manager.create_filtered_array(kind, predicate, query)
    }

    /// Reloads every entity of a kind through the adapter, then resolves to
    /// the kind's live array.
    ///
    /// Overlapping calls for a kind share one adapter request.
    pub fn find_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<RecordArray>> {
        if let Err(err) = self.inner.ensure_alive() {
            return future::ready(Err(err)).boxed_local();
        }
        let refresh = self.manager.refresh_live_array(kind);
        let manager = self.manager.clone();
        let kind = kind.clone();
        async move {
            refresh.await?;
            manager.live_array_for(&kind)
        }
        .boxed_local()
    }

    /// Runs a query through the adapter.
    ///
    /// The populated array is created immediately and resolves once the
    /// response has been pushed and loaded into it.
    pub fn query(&self, kind: &Kind, query: Document) -> Result<(RecordArray, LocalBoxFuture<'static, Result<RecordArray>>)> {
        self.inner.ensure_alive()?;
        let array = self.manager.create_populated_array(kind, Some(query), None)?;
        let loading = self.update_query(&array)?;
        Ok((array, loading))
    }

    /// Re-runs the query of a populated array and reloads it with the
    /// response.
    pub fn update_query(&self, array: &RecordArray) -> Result<LocalBoxFuture<'static, Result<RecordArray>>> {
        self.inner.ensure_alive()?;
        let query = array
            .query()
            .cloned()
            .ok_or_else(|| Error::invalid_operation("update_query expects an array created by query"))?;
        let request = self.inner.adapter.query(array.kind(), &query);
        let store = self.inner.clone();
        let manager = self.manager.clone();
        let array = array.clone();
        Ok(async move {
            let response = request.await?;
            let result = response.to_query_result();
            for record in response.records {
                store.push(array.kind(), record)?;
            }
            manager.load_populated_array(&array, result)?;
            Ok(array)
        }
        .boxed_local())
    }

    // ========== Lifecycle ==========

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Tears down the manager and drops every cached entity.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        self.manager.destroy();
        let entities = {
            let mut map = self.inner.map.borrow_mut();
            let count = map.total_count();
            map.clear();
            count
        };
        debug!(entities, "store destroyed");
    }
}
