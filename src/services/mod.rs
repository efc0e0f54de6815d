pub mod cost_tracker;
pub mod dependency_resolver;
pub mod detectors;
pub mod event_bus;
pub mod metrics_engine;
pub mod scope_store;
pub mod snapshot_flusher;

pub use cost_tracker::{ModelPricing, StaticPricing};
pub use dependency_resolver::{DeadlockStats, DependencyGraph, DependencyResolver};
pub use event_bus::{EventBus, EventBusConfig, PublishOptions};
pub use metrics_engine::{IssueBoard, MetricsEngine};
pub use scope_store::ScopeStore;
pub use snapshot_flusher::{FlushOutcome, FlushStatus, FlusherHandle, SnapshotFlusher, SnapshotFlusherConfig};
