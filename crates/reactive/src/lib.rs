//! Trellis Reactive - Self-updating record arrays over an entity cache.
//!
//! This crate keeps derived collections of cached entities in sync with the
//! cache. Storage reports individual entity changes; the manager coalesces
//! them into one deferred flush per unit of work and pushes minimal
//! add/remove deltas into every affected array.
//!
//! # Core Concepts
//!
//! - `RecordArray`: A live, filtered or externally-populated collection
//! - `ArrayChange`: The delta one bulk mutation applied to an array
//! - `RecordArrayManager`: Owns the arrays and runs the flush engine
//! - `EntitySource`: The identity map the manager reads entity state from
//! - `Scheduler`: Defers the flush to the end of the current unit of work
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use trellis_reactive::{RecordArrayManager, TaskQueue};
//!
//! let queue = Rc::new(TaskQueue::new());
//! let manager = RecordArrayManager::new(source, queue.clone());
//!
//! let adults = manager.create_filtered_array(
//!     &person,
//!     Rc::new(|r| r.get("age").and_then(|v| v.as_i64()).unwrap_or(0) > 18),
//!     None,
//! )?;
//! adults.subscribe(|change| {
//!     println!("Added: {}, Removed: {}", change.added.len(), change.removed.len());
//! });
//!
//! manager.mark_changed(&EntityKey::new(person.clone(), 1));
//! manager.mark_changed(&EntityKey::new(person.clone(), 2));
//!
//! // One flush for both marks
//! queue.run_until_idle();
//! ```

pub mod array;
pub mod change_set;
pub mod config;
mod flush;
pub mod manager;
pub mod membership;
mod refresh;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod subscription;
pub mod tracker;

pub use array::{ArrayId, ArrayVariant, Document, Predicate, QueryResult, RecordArray};
pub use change_set::ArrayChange;
pub use config::{LiveSync, ManagerConfig};
pub use flush::FlushReport;
pub use manager::{RecordArrayManager, WeakManager};
pub use refresh::RefreshHandle;
pub use scheduler::{Scheduler, Task, TaskQueue};
pub use source::EntitySource;
pub use subscription::{ChangeCallback, SubscriptionId, SubscriptionManager};

// Re-export commonly used types from the core crate
pub use trellis_core::{EntityId, EntityKey, Error, Kind, Record, Result, Value};
