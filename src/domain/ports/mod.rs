//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the engine depends on but does not implement itself:
//! - SnapshotRepository: durable storage for scope snapshots
//! - PricingProvider: token-to-cost pricing
//! - AlertListener: consumers of the alert stream

pub mod alert_listener;
pub mod pricing;
pub mod snapshot_repository;

pub use alert_listener::AlertListener;
pub use pricing::PricingProvider;
pub use snapshot_repository::SnapshotRepository;
