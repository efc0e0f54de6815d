//! Overwatch - hierarchical metrics and anomaly detection
//!
//! Overwatch accumulates counters, rates, token usage and timings at nested
//! scopes (task, phase, PRD, PRD set), keeps bounded sample histories per
//! monitored signal, runs trend and structural detectors over them and emits
//! de-duplicated alerts.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Data model, port traits and error types
//! - **Service Layer** (`services`): Scope store, detectors, alert bus and engine
//! - **Infrastructure Layer** (`infrastructure`): Config, logging and snapshot files
//! - **CLI Layer** (`cli`): Snapshot inspection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use overwatch::{Config, EventBus, MetricsEngine, ScopeKind, ScopeStore};
//!
//! let config = Config::default();
//! let engine = MetricsEngine::from_config(
//!     &config,
//!     Arc::new(ScopeStore::new()),
//!     Arc::new(EventBus::default()),
//! );
//! let prd = engine.store().start_scope(ScopeKind::Prd, "prd-1", None, Default::default())?;
//! engine.check_all(&prd, chrono::Utc::now());
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AlertEvent, AlertSeverity, Config, FinalStatus, IssueKind, LoggingConfig, Outcome, Scope,
    ScopeKind, ScopeRef, ScopeSnapshot, TokenUsage,
};
pub use domain::ports::{AlertListener, PricingProvider, SnapshotRepository};
pub use domain::{ScopeError, SnapshotError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::persistence::JsonSnapshotRepository;
pub use services::{DependencyResolver, EventBus, MetricsEngine, ScopeStore, SnapshotFlusher};
