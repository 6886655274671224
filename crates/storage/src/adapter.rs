//! Adapters load records from a backend on behalf of the store.

use futures::future::{self, FutureExt, LocalBoxFuture};
use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use trellis_core::{EntityId, Error, Kind, Record, Result};
use trellis_reactive::{Document, QueryResult};

/// Records returned for a query, with response metadata.
#[derive(Clone, Debug, Default)]
pub struct QueryResponse {
    pub records: Vec<Record>,
    pub meta: Option<Document>,
    pub links: Option<Document>,
}

impl QueryResponse {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            meta: None,
            links: None,
        }
    }

    /// Converts the response into the id list a populated array loads.
    pub fn to_query_result(&self) -> QueryResult {
        QueryResult {
            ids: self.records.iter().map(Record::id).collect(),
            meta: self.meta.clone(),
            links: self.links.clone(),
        }
    }
}

/// A backend the store loads records from.
pub trait Adapter {
    /// Loads every record of a kind.
    fn find_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<Vec<Record>>>;

    /// Loads the records of a kind matching a query.
    fn query(&self, kind: &Kind, query: &Document) -> LocalBoxFuture<'static, Result<QueryResponse>>;
}

/// An adapter serving records from memory.
///
/// A query matches records whose attributes equal every entry of the query
/// document. Responses carry a `total` entry in `meta`.
#[derive(Default)]
pub struct MemoryAdapter {
    records: RefCell<HashMap<Kind, BTreeMap<EntityId, Record>>>,
    failures: RefCell<HashMap<Kind, String>>,
    requests: Cell<usize>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a backend record.
    pub fn insert(&self, kind: &Kind, record: Record) {
        self.records
            .borrow_mut()
            .entry(kind.clone())
            .or_default()
            .insert(record.id(), record);
    }

    /// Makes every request for a kind fail until cleared.
    pub fn fail(&self, kind: &Kind, message: impl Into<String>) {
        self.failures.borrow_mut().insert(kind.clone(), message.into());
    }

    pub fn clear_failure(&self, kind: &Kind) {
        self.failures.borrow_mut().remove(kind);
    }

    /// Returns the number of requests served, failed ones included.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }

    fn check(&self, kind: &Kind) -> Result<()> {
        self.requests.set(self.requests.get() + 1);
        match self.failures.borrow().get(kind) {
            Some(message) => Err(Error::adapter(kind.clone(), message.clone())),
            None => Ok(()),
        }
    }

    fn matching(&self, kind: &Kind, query: &Document) -> Vec<Record> {
        self.records
            .borrow()
            .get(kind)
            .map(|records| {
                records
                    .values()
                    .filter(|record| query.iter().all(|(name, value)| record.get(name) == Some(value)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Adapter for MemoryAdapter {
    fn find_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<Vec<Record>>> {
        let result = self.check(kind).map(|()| self.matching(kind, &Document::new()));
        future::ready(result).boxed_local()
    }

    fn query(&self, kind: &Kind, query: &Document) -> LocalBoxFuture<'static, Result<QueryResponse>> {
        let result = self.check(kind).map(|()| {
            let records = self.matching(kind, query);
            let mut meta = Document::new();
            meta.insert("total".into(), (records.len() as i64).into());
            QueryResponse {
                records,
                meta: Some(meta),
                links: None,
            }
        });
        future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use trellis_core::Value;

    fn person() -> Kind {
        Kind::new("person").unwrap()
    }

    #[test]
    fn test_adapter_find_all() {
        let adapter = MemoryAdapter::new();
        adapter.insert(&person(), Record::new(2));
        adapter.insert(&person(), Record::new(1));

        let records = block_on(adapter.find_all(&person())).unwrap();
        let ids: Vec<EntityId> = records.iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(adapter.requests(), 1);
    }

    #[test]
    fn test_adapter_query_matches_attributes() {
        let adapter = MemoryAdapter::new();
        adapter.insert(&person(), Record::new(1).with("team", "core"));
        adapter.insert(&person(), Record::new(2).with("team", "data"));

        let mut query = Document::new();
        query.insert("team".into(), Value::from("core"));
        let response = block_on(adapter.query(&person(), &query)).unwrap();

        assert_eq!(response.to_query_result().ids, vec![1]);
        assert_eq!(
            response.meta.unwrap().get("total"),
            Some(&Value::Int64(1))
        );
    }

    #[test]
    fn test_adapter_failure() {
        let adapter = MemoryAdapter::new();
        adapter.fail(&person(), "offline");

        let err = block_on(adapter.find_all(&person())).unwrap_err();
        assert_eq!(err, Error::adapter(person(), "offline"));

        adapter.clear_failure(&person());
        assert!(block_on(adapter.find_all(&person())).is_ok());
    }
}
