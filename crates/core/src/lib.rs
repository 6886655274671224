//! Trellis Core - Core entity types for Trellis record arrays.
//!
//! This crate provides the foundational types shared by the record-array
//! manager and the storage layer:
//!
//! - `Kind`: A validated entity type identifier
//! - `EntityKey`: Kind plus id, the identity of a cached entity
//! - `EntityState`: Lifecycle state deciding visibility in derived arrays
//! - `Record`: The materialized view that filter predicates evaluate
//! - `Value`: Attribute values
//! - `Error`: Error types for manager and store operations
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{EntityKey, Kind, Record, Value};
//!
//! let person = Kind::new("person").unwrap();
//! let record = Record::new(1).with("name", "Tom Dale").with("age", 40i64);
//!
//! let key = EntityKey::new(person, record.id());
//! assert_eq!(key.to_string(), "person#1");
//! assert_eq!(record.get("age"), Some(&Value::Int64(40)));
//! ```

#![no_std]

extern crate alloc;

mod entity;
mod error;
mod kind;
mod record;
mod value;

pub use entity::{EntityKey, EntityState};
pub use error::{Error, Result};
pub use kind::Kind;
pub use record::{EntityId, Record};
pub use value::Value;
