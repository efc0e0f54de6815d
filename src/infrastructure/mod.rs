//! Infrastructure layer module
//!
//! Adapters for the outside world:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Snapshot persistence (JSON on disk)
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod logging;
pub mod persistence;
