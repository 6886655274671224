//! Shared fixtures for the reactive integration tests.

#![allow(dead_code)]

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use trellis_core::{EntityId, EntityState, Error, Kind, Record, Result, Value};
use trellis_reactive::{ArrayChange, EntitySource, Predicate, RecordArray};

/// An in-memory entity source that counts scans and holds reloads open
/// until the test completes them.
#[derive(Default)]
pub struct MapSource {
    entities: RefCell<BTreeMap<(Kind, EntityId), (EntityState, Record)>>,
    reloads: RefCell<Vec<(Kind, oneshot::Sender<Result<()>>)>>,
    pub id_scans: Cell<usize>,
    pub reload_calls: Cell<usize>,
}

impl MapSource {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn put(&self, kind: &Kind, record: Record, state: EntityState) {
        self.entities
            .borrow_mut()
            .insert((kind.clone(), record.id()), (state, record));
    }

    pub fn set_state(&self, kind: &Kind, id: EntityId, state: EntityState) {
        if let Some(entry) = self.entities.borrow_mut().get_mut(&(kind.clone(), id)) {
            entry.0 = state;
        }
    }

    /// Resolves every open reload with `result`.
    pub fn complete_reloads(&self, result: Result<()>) {
        for (_, sender) in self.reloads.borrow_mut().drain(..) {
            let _ = sender.send(result.clone());
        }
    }
}

impl EntitySource for MapSource {
    fn entity_ids(&self, kind: &Kind) -> Vec<EntityId> {
        self.id_scans.set(self.id_scans.get() + 1);
        self.entities
            .borrow()
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, id)| *id)
            .collect()
    }

    fn entity_count(&self, kind: &Kind) -> usize {
        self.entities.borrow().keys().filter(|(k, _)| k == kind).count()
    }

    fn is_hidden(&self, kind: &Kind, id: EntityId) -> bool {
        self.entities
            .borrow()
            .get(&(kind.clone(), id))
            .map_or(true, |(state, _)| state.is_hidden())
    }

    fn is_empty(&self, kind: &Kind, id: EntityId) -> bool {
        self.entities
            .borrow()
            .get(&(kind.clone(), id))
            .map_or(true, |(state, _)| state.is_empty())
    }

    fn record(&self, kind: &Kind, id: EntityId) -> Option<Record> {
        self.entities.borrow().get(&(kind.clone(), id)).map(|(_, r)| r.clone())
    }

    fn reload_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<()>> {
        self.reload_calls.set(self.reload_calls.get() + 1);
        let (sender, receiver) = oneshot::channel();
        self.reloads.borrow_mut().push((kind.clone(), sender));
        let kind = kind.clone();
        async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(Error::adapter(kind, "reload dropped")))
        }
        .boxed_local()
    }
}

pub fn kind(name: &str) -> Kind {
    Kind::new(name).unwrap()
}

pub fn person(id: EntityId, age: i64) -> Record {
    Record::new(id).with("name", format!("person {id}")).with("age", age)
}

pub fn older_than(age: i64) -> Predicate {
    Rc::new(move |r: &Record| r.get("age").and_then(Value::as_i64).unwrap_or(0) > age)
}

/// Folds every change an array emits into one net change.
pub fn record_changes(array: &RecordArray) -> Rc<RefCell<(usize, ArrayChange)>> {
    let log = Rc::new(RefCell::new((0, ArrayChange::new())));
    let log_clone = log.clone();
    array.subscribe(move |change| {
        let mut log = log_clone.borrow_mut();
        log.0 += 1;
        log.1.merge(change.clone());
    });
    log
}
