//! Trellis Storage - In-memory entity cache for Trellis record arrays.
//!
//! This crate provides a reference store built on the record-array manager:
//!
//! - `IdentityMap`: Per-kind tables of cached entities and their states
//! - `Adapter`: The backend interface records are loaded through
//! - `MemoryAdapter`: An adapter serving records from memory
//! - `MemoryStore`: The store that reports every write to its manager
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use trellis_core::{Kind, Record, Value};
//! use trellis_reactive::TaskQueue;
//! use trellis_storage::{MemoryAdapter, MemoryStore};
//!
//! let queue = Rc::new(TaskQueue::new());
//! let store = MemoryStore::new(Rc::new(MemoryAdapter::new()), queue.clone());
//! let person = Kind::new("person").unwrap();
//!
//! let people = store.peek_all(&person).unwrap();
//! let adults = store
//!     .filter(
//!         &person,
//!         Rc::new(|r: &Record| r.get("age").and_then(Value::as_i64).unwrap_or(0) > 18),
//!         None,
//!     )
//!     .unwrap();
//!
//! store.push(&person, Record::new(1).with("age", 40i64)).unwrap();
//! store.push(&person, Record::new(2).with("age", 9i64)).unwrap();
//!
//! // Arrays update at the end of the unit of work
//! assert!(people.is_empty());
//! queue.run_until_idle();
//!
//! assert_eq!(people.content(), vec![1, 2]);
//! assert_eq!(adults.content(), vec![1]);
//! ```

pub mod adapter;
pub mod identity_map;
pub mod store;

pub use adapter::{Adapter, MemoryAdapter, QueryResponse};
pub use identity_map::{Entity, IdentityMap, Upsert};
pub use store::MemoryStore;
