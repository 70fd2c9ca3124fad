//! # Process Identifiers
//!
//! A [`ProcessRef`] is the only way to address a process. It stays valid as a
//! token after the process terminates, so it can still be logged, compared and
//! used as a map key; delivering to it simply fails.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, cheaply cloneable process identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessRef(Arc<str>);

impl ProcessRef {
    /// Allocates a fresh identifier backed by a random UUID.
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Wraps an identifier minted elsewhere, e.g. by a remote node.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProcessRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessRef({})", self.0)
    }
}
