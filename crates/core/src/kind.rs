//! Entity kind identifiers.

use crate::error::{Error, Result};
use alloc::sync::Arc;
use core::borrow::Borrow;
use core::fmt;

/// The type identifier of an entity (e.g. `"person"`, `"compact-person"`).
///
/// A `Kind` is always a plain identifier: ASCII alphanumerics plus `-`, `_`,
/// `.` and `/`, starting with an alphanumeric character. Anything else, such
/// as a serialized type descriptor, is rejected at construction so that every
/// manager operation can take a `&Kind` without re-validating it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind(Arc<str>);

impl Kind {
    /// Creates a validated kind.
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(Error::invalid_kind(name, "kind must not be empty")),
            Some(first) if !first.is_ascii_alphanumeric() => {
                return Err(Error::invalid_kind(
                    name,
                    "kind must start with an alphanumeric character",
                ));
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')) {
            return Err(Error::invalid_kind(
                name,
                "expected a plain kind identifier, not a structured descriptor",
            ));
        }
        Ok(Kind(Arc::from(name)))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", &self.0)
    }
}

impl Borrow<str> for Kind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Kind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Kind {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self> {
        Kind::new(name)
    }
}
