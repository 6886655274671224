//! Error types for Trellis.

use crate::kind::Kind;
use crate::record::EntityId;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Trellis operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for record-array and store operations.
///
/// Errors are `Clone` so that a single failed refresh can be observed by
/// every holder of the shared refresh handle.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A kind identifier failed validation.
    #[error("Invalid kind {kind:?}: {reason}")]
    InvalidKind { kind: String, reason: &'static str },
    /// An entity was not found in the identity map.
    #[error("Not found: {kind}#{id}")]
    NotFound { kind: Kind, id: EntityId },
    /// The operation does not apply to the given target.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
    /// An adapter failed to load data.
    #[error("Adapter error for {kind}: {message}")]
    Adapter { kind: Kind, message: String },
    /// The manager or store has been torn down.
    #[error("Destroyed: {what}")]
    Destroyed { what: &'static str },
}

impl Error {
    /// Creates an invalid kind error.
    pub fn invalid_kind(kind: impl Into<String>, reason: &'static str) -> Self {
        Error::InvalidKind {
            kind: kind.into(),
            reason,
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: Kind, id: EntityId) -> Self {
        Error::NotFound { kind, id }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an adapter error.
    pub fn adapter(kind: Kind, message: impl Into<String>) -> Self {
        Error::Adapter {
            kind,
            message: message.into(),
        }
    }

    /// Creates a destroyed error.
    pub fn destroyed(what: &'static str) -> Self {
        Error::Destroyed { what }
    }
}
