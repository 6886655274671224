//! Record arrays: derived, self-updating collections of entity ids.
//!
//! Three variants share one handle type:
//!
//! - `Live`: every visible, non-empty entity of a kind
//! - `Filtered`: visible entities of a kind matching a predicate
//! - `Populated`: an explicit list supplied by a query result
//!
//! Arrays never decide their own membership. The manager computes patches
//! and applies them through the crate-private bulk mutators, each of which
//! emits at most one `ArrayChange` to subscribers.

use crate::change_set::ArrayChange;
use crate::subscription::{SubscriptionId, SubscriptionManager};
use hashbrown::HashSet;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use trellis_core::{EntityId, Kind, Record, Value};
use tracing::trace;

/// Unique identifier for a record array within its manager.
pub type ArrayId = u64;

/// A filter predicate over a materialized record.
///
/// Re-invoked on every evaluation; results are never cached.
pub type Predicate = Rc<dyn Fn(&Record) -> bool>;

/// Opaque query parameters or response metadata, copied verbatim.
pub type Document = BTreeMap<String, Value>;

/// The variant of a record array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayVariant {
    Live,
    Filtered,
    Populated,
}

/// The result of a query, used to populate an externally-populated array.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    /// Ids in response order
    pub ids: Vec<EntityId>,
    /// Response metadata
    pub meta: Option<Document>,
    /// Pagination links
    pub links: Option<Document>,
}

impl QueryResult {
    pub fn new(ids: Vec<EntityId>) -> Self {
        Self {
            ids,
            meta: None,
            links: None,
        }
    }

    pub fn with_meta(mut self, meta: Document) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_links(mut self, links: Document) -> Self {
        self.links = Some(links);
        self
    }
}

struct ArrayState {
    content: Vec<EntityId>,
    members: HashSet<EntityId>,
    predicate: Option<Predicate>,
    meta: Option<Document>,
    links: Option<Document>,
    is_loaded: bool,
    is_updating: bool,
    is_destroyed: bool,
}

struct ArrayInner {
    id: ArrayId,
    kind: Kind,
    exposed_kind: Kind,
    variant: ArrayVariant,
    query: Option<Document>,
    state: RefCell<ArrayState>,
    subscriptions: RefCell<SubscriptionManager>,
}

/// A handle to a record array. Clones share the same array.
#[derive(Clone)]
pub struct RecordArray {
    inner: Rc<ArrayInner>,
}

impl RecordArray {
    fn build(
        id: ArrayId,
        kind: Kind,
        exposed_kind: Kind,
        variant: ArrayVariant,
        query: Option<Document>,
        content: Vec<EntityId>,
        is_loaded: bool,
    ) -> Self {
        let members = content.iter().copied().collect();
        Self {
            inner: Rc::new(ArrayInner {
                id,
                kind,
                exposed_kind,
                variant,
                query,
                state: RefCell::new(ArrayState {
                    content,
                    members,
                    predicate: None,
                    meta: None,
                    links: None,
                    is_loaded,
                    is_updating: false,
                    is_destroyed: false,
                }),
                subscriptions: RefCell::new(SubscriptionManager::new()),
            }),
        }
    }

    pub(crate) fn new_live(
        id: ArrayId,
        kind: Kind,
        exposed_kind: Kind,
        content: Vec<EntityId>,
        is_updating: bool,
    ) -> Self {
        let array = Self::build(id, kind, exposed_kind, ArrayVariant::Live, None, content, true);
        array.inner.state.borrow_mut().is_updating = is_updating;
        array
    }

    pub(crate) fn new_filtered(id: ArrayId, kind: Kind, predicate: Predicate, query: Option<Document>) -> Self {
        let array = Self::build(id, kind.clone(), kind, ArrayVariant::Filtered, query, Vec::new(), true);
        array.inner.state.borrow_mut().predicate = Some(predicate);
        array
    }

    pub(crate) fn new_populated(id: ArrayId, kind: Kind, query: Option<Document>, result: Option<QueryResult>) -> Self {
        match result {
            Some(result) => {
                let mut seen = HashSet::with_capacity(result.ids.len());
                let content = result.ids.into_iter().filter(|id| seen.insert(*id)).collect();
                let array = Self::build(id, kind.clone(), kind, ArrayVariant::Populated, query, content, true);
                {
                    let mut state = array.inner.state.borrow_mut();
                    state.meta = result.meta;
                    state.links = result.links;
                }
                array
            }
            None => Self::build(id, kind.clone(), kind, ArrayVariant::Populated, query, Vec::new(), false),
        }
    }

    /// Returns the array ID.
    #[inline]
    pub fn id(&self) -> ArrayId {
        self.inner.id
    }

    /// Returns the storage kind this array tracks.
    #[inline]
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Returns the kind the array is exposed as. Equal to `kind()` except for
    /// live arrays that project one storage kind under another name.
    #[inline]
    pub fn exposed_kind(&self) -> &Kind {
        &self.inner.exposed_kind
    }

    #[inline]
    pub fn variant(&self) -> ArrayVariant {
        self.inner.variant
    }

    /// Returns the query this array was created for, if any.
    pub fn query(&self) -> Option<&Document> {
        self.inner.query.as_ref()
    }

    /// Returns a copy of the current content, in insertion order.
    pub fn content(&self) -> Vec<EntityId> {
        self.inner.state.borrow().content.clone()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().content.len()
    }

    /// Returns true if the array has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().content.is_empty()
    }

    /// Checks membership of an entity id.
    pub fn contains(&self, id: EntityId) -> bool {
        self.inner.state.borrow().members.contains(&id)
    }

    /// Returns the current filter predicate of a filtered array.
    pub fn predicate(&self) -> Option<Predicate> {
        self.inner.state.borrow().predicate.clone()
    }

    /// Response metadata of a populated array.
    pub fn meta(&self) -> Option<Document> {
        self.inner.state.borrow().meta.clone()
    }

    /// Pagination links of a populated array.
    pub fn links(&self) -> Option<Document> {
        self.inner.state.borrow().links.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.borrow().is_loaded
    }

    /// True while a bulk reload of the array's kind is in flight.
    pub fn is_updating(&self) -> bool {
        self.inner.state.borrow().is_updating
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().is_destroyed
    }

    /// Subscribes to membership changes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ArrayChange) + 'static,
    {
        self.inner.subscriptions.borrow_mut().subscribe(callback)
    }

    /// Unsubscribes by ID.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.borrow_mut().unsubscribe(id)
    }

    /// Returns the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Returns true if both handles refer to the same array.
    #[inline]
    pub fn ptr_eq(&self, other: &RecordArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Appends ids that are not members yet. Emits one change set.
    ///
    /// Returns the number of ids actually added.
    pub(crate) fn push_entities(&self, ids: &[EntityId]) -> usize {
        let added = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_destroyed {
                trace!(array = self.inner.id, "push on destroyed array ignored");
                return 0;
            }
            let mut added = Vec::with_capacity(ids.len());
            for &id in ids {
                if state.members.insert(id) {
                    state.content.push(id);
                    added.push(id);
                }
            }
            added
        };
        let count = added.len();
        if count > 0 {
            self.notify(&ArrayChange::added(added));
        }
        count
    }

    /// Removes the given ids. Emits one change set.
    ///
    /// Returns the number of ids actually removed.
    pub(crate) fn remove_entities(&self, ids: &[EntityId]) -> usize {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_destroyed {
                trace!(array = self.inner.id, "remove on destroyed array ignored");
                return 0;
            }
            let removed: Vec<EntityId> = ids.iter().copied().filter(|id| state.members.remove(id)).collect();
            if !removed.is_empty() {
                let gone: HashSet<EntityId> = removed.iter().copied().collect();
                state.content.retain(|id| !gone.contains(id));
            }
            removed
        };
        let count = removed.len();
        if count > 0 {
            self.notify(&ArrayChange::removed(removed));
        }
        count
    }

    /// Replaces the whole content with a query result. Emits one change set
    /// with the difference between old and new content.
    pub(crate) fn load(&self, result: QueryResult) -> ArrayChange {
        let change = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_destroyed {
                return ArrayChange::new();
            }
            let mut next = HashSet::with_capacity(result.ids.len());
            let content: Vec<EntityId> = result.ids.into_iter().filter(|id| next.insert(*id)).collect();
            let removed: Vec<EntityId> = state.content.iter().copied().filter(|id| !next.contains(id)).collect();
            let added: Vec<EntityId> = content.iter().copied().filter(|id| !state.members.contains(id)).collect();

            state.content = content;
            state.members = next;
            state.meta = result.meta;
            state.links = result.links;
            state.is_loaded = true;
            state.is_updating = false;
            ArrayChange { added, removed }
        };
        if !change.is_empty() {
            self.notify(&change);
        }
        change
    }

    pub(crate) fn set_predicate(&self, predicate: Predicate) {
        self.inner.state.borrow_mut().predicate = Some(predicate);
    }

    pub(crate) fn set_updating(&self, updating: bool) {
        let mut state = self.inner.state.borrow_mut();
        if !state.is_destroyed {
            state.is_updating = updating;
        }
    }

    /// Marks the array destroyed, drops its content and subscribers.
    ///
    /// Returns the ids it held.
    pub(crate) fn destroy(&self) -> Vec<EntityId> {
        let content = {
            let mut state = self.inner.state.borrow_mut();
            if state.is_destroyed {
                return Vec::new();
            }
            state.is_destroyed = true;
            state.is_updating = false;
            state.members.clear();
            state.predicate = None;
            std::mem::take(&mut state.content)
        };
        self.inner.subscriptions.borrow_mut().clear();
        content
    }

    fn notify(&self, change: &ArrayChange) {
        let callbacks = self.inner.subscriptions.borrow().callbacks();
        for callback in callbacks {
            callback(change);
        }
    }
}

impl fmt::Debug for RecordArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordArray")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("exposed_kind", &self.inner.exposed_kind)
            .field("variant", &self.inner.variant)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Kind {
        Kind::new("person").unwrap()
    }

    fn recorder(array: &RecordArray) -> Rc<RefCell<Vec<ArrayChange>>> {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let changes_clone = changes.clone();
        array.subscribe(move |change| changes_clone.borrow_mut().push(change.clone()));
        changes
    }

    #[test]
    fn test_live_array_initial_content() {
        let array = RecordArray::new_live(1, person(), person(), vec![1, 2, 3], false);
        assert_eq!(array.variant(), ArrayVariant::Live);
        assert_eq!(array.content(), vec![1, 2, 3]);
        assert!(array.contains(2));
        assert!(array.is_loaded());
        assert!(!array.is_updating());
    }

    #[test]
    fn test_push_skips_members_and_emits_once() {
        let array = RecordArray::new_live(1, person(), person(), vec![1], false);
        let changes = recorder(&array);

        assert_eq!(array.push_entities(&[1, 2, 3, 2]), 2);
        assert_eq!(array.content(), vec![1, 2, 3]);
        assert_eq!(changes.borrow().len(), 1);
        assert_eq!(changes.borrow()[0].added, vec![2, 3]);

        // Nothing new: no notification
        assert_eq!(array.push_entities(&[1, 3]), 0);
        assert_eq!(changes.borrow().len(), 1);
    }

    #[test]
    fn test_remove_entities() {
        let array = RecordArray::new_live(1, person(), person(), vec![1, 2, 3], false);
        let changes = recorder(&array);

        assert_eq!(array.remove_entities(&[2, 9]), 1);
        assert_eq!(array.content(), vec![1, 3]);
        assert_eq!(changes.borrow()[0].removed, vec![2]);
    }

    #[test]
    fn test_populated_load_replaces_content() {
        let mut meta = Document::new();
        meta.insert("total".into(), Value::Int64(2));

        let array = RecordArray::new_populated(1, person(), None, None);
        assert!(!array.is_loaded());

        let change = array.load(QueryResult::new(vec![4, 5]).with_meta(meta));
        assert_eq!(change.added, vec![4, 5]);
        assert!(array.is_loaded());
        assert_eq!(array.meta().and_then(|m| m.get("total").cloned()), Some(Value::Int64(2)));

        let change = array.load(QueryResult::new(vec![5, 6]));
        assert_eq!(change.added, vec![6]);
        assert_eq!(change.removed, vec![4]);
        assert_eq!(array.content(), vec![5, 6]);
        assert!(array.meta().is_none());
    }

    #[test]
    fn test_destroyed_array_ignores_mutation() {
        let array = RecordArray::new_live(1, person(), person(), vec![1, 2], false);
        array.subscribe(|_| {});

        assert_eq!(array.destroy(), vec![1, 2]);
        assert!(array.is_destroyed());
        assert_eq!(array.subscription_count(), 0);
        assert_eq!(array.push_entities(&[3]), 0);
        assert!(array.is_empty());
        assert!(array.destroy().is_empty());
    }

    #[test]
    fn test_filtered_predicate() {
        let predicate: Predicate = Rc::new(|r: &Record| r.get("age").and_then(Value::as_i64).unwrap_or(0) > 18);
        let array = RecordArray::new_filtered(7, person(), predicate, None);
        let p = array.predicate().unwrap();
        assert!(p(&Record::new(1).with("age", 30i64)));
        assert!(!p(&Record::new(2).with("age", 10i64)));
    }

    #[test]
    fn test_subscriber_can_read_array() {
        let array = RecordArray::new_live(1, person(), person(), vec![], false);
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = seen.clone();
        let handle = array.clone();
        array.subscribe(move |_| *seen_clone.borrow_mut() = handle.len());

        array.push_entities(&[1, 2]);
        assert_eq!(*seen.borrow(), 2);
    }
}
