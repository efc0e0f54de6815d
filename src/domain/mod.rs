//! Domain layer for the Overwatch metrics engine
//!
//! This module contains the data model, port traits and error types.

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::{ScopeError, SnapshotError};
