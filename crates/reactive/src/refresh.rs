//! Bulk refresh coordination.
//!
//! At most one reload per kind is in flight. A second request for the same
//! kind receives a clone of the pending `RefreshHandle`, so every caller
//! observes the same outcome.

use crate::manager::RecordArrayManager;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use trellis_core::{Error, Kind, Result};
use tracing::{debug, trace};

/// A cloneable handle to a pending reload of one kind.
///
/// The scheduler drives the reload, so dropping every handle does not stall
/// it. Use `Shared::ptr_eq` to compare two handles.
pub type RefreshHandle = Shared<LocalBoxFuture<'static, Result<()>>>;

impl RecordArrayManager {
    /// Reloads every entity of `kind` through the source.
    ///
    /// While the reload runs, the live arrays of the kind report
    /// `is_updating`. Completion clears the flag whether the reload succeeded
    /// or failed, and whether or not any handle is awaited. Failures reach
    /// every handle holder unchanged.
    pub fn refresh_live_array(&self, kind: &Kind) -> RefreshHandle {
        {
            let state = self.state();
            if state.destroyed {
                return future::ready(Err(Error::destroyed("record array manager")))
                    .boxed_local()
                    .shared();
            }
            if let Some(handle) = state.in_flight.get(kind) {
                trace!(kind = %kind, "refresh already in flight");
                return handle.clone();
            }
        }

        self.begin_update_all(kind);
        let reload = self.source().reload_all(kind);
        let weak = self.downgrade();
        let finished = kind.clone();
        let handle = async move {
            let result = reload.await;
            match &result {
                Ok(()) => debug!(kind = %finished, "refresh finished"),
                Err(err) => debug!(kind = %finished, error = %err, "refresh failed"),
            }
            match weak.upgrade() {
                Some(manager) => manager.finish_update_all(&finished),
                None => trace!(kind = %finished, "refresh finished after manager drop"),
            }
            result
        }
        .boxed_local()
        .shared();

        self.state_mut().in_flight.insert(kind.clone(), handle.clone());
        self.scheduler().spawn(handle.clone().map(|_| ()).boxed_local());
        debug!(kind = %kind, "refresh started");
        handle
    }

    /// Returns true if a refresh of `kind` is in flight.
    pub fn is_refreshing(&self, kind: &Kind) -> bool {
        self.state().in_flight.contains_key(kind)
    }

    /// Marks the live arrays of `kind` as updating.
    pub fn begin_update_all(&self, kind: &Kind) {
        for array in self.state().registry.live_arrays_for(kind) {
            array.set_updating(true);
        }
    }

    /// Clears the updating flag of the live arrays of `kind` and forgets any
    /// in-flight refresh of it.
    pub fn finish_update_all(&self, kind: &Kind) {
        let arrays = {
            let mut state = self.state_mut();
            state.in_flight.remove(kind);
            state.registry.live_arrays_for(kind)
        };
        for array in arrays {
            array.set_updating(false);
        }
    }
}
