//! The storage-side interface the manager reads from.

use futures::future::LocalBoxFuture;
use trellis_core::{EntityId, Kind, Record, Result};

/// The identity map a `RecordArrayManager` derives its arrays from.
///
/// Entities unknown to the source must report `is_hidden == true`.
pub trait EntitySource {
    /// Ids of every tracked entity of a kind, hidden ones included.
    fn entity_ids(&self, kind: &Kind) -> Vec<EntityId>;

    /// Number of tracked entities of a kind, hidden ones included.
    fn entity_count(&self, kind: &Kind) -> usize {
        self.entity_ids(kind).len()
    }

    /// Hidden entities never belong to live or filtered arrays.
    fn is_hidden(&self, kind: &Kind, id: EntityId) -> bool;

    /// Empty entities have no data materialized yet.
    fn is_empty(&self, kind: &Kind, id: EntityId) -> bool;

    /// The materialized view predicates are evaluated against.
    fn record(&self, kind: &Kind, id: EntityId) -> Option<Record>;

    /// Forces a reload of every entity of a kind.
    fn reload_all(&self, kind: &Kind) -> LocalBoxFuture<'static, Result<()>>;
}
