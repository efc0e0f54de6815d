use thiserror::Error;

use super::models::scope::{ScopeKind, ScopeRef};

/// Errors raised by the scope store.
///
/// Only scope creation fails loudly; recording calls log and carry on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Scope already exists: {0}")]
    DuplicateScope(ScopeRef),

    #[error("Scope not found: {0}")]
    UnknownScope(ScopeRef),

    #[error("A {kind} scope cannot have a parent (got '{parent_id}')")]
    InvalidParent { kind: ScopeKind, parent_id: String },

    #[error("Scope id cannot be empty")]
    EmptyId,
}

/// Errors raised by snapshot persistence.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
