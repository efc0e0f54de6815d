pub mod alert;
pub mod category;
pub mod config;
pub mod history;
pub mod issue;
pub mod samples;
pub mod scope;
pub mod snapshot;

pub use alert::{AlertEvent, AlertSeverity};
pub use category::{
    CategoryEvent, CategoryMetrics, ContributionSignal, ContributionStats, FileFilterOutcome,
    FileFilterStats, IpcOutcome, IpcStats, MetricCategory, SchemaOperation, SchemaStats,
    SessionEvent, SessionStats, TestResults, TestStats, ValidationOutcome, ValidationStats,
};
pub use config::{
    AlertsConfig, Config, DeadlockConfig, DetectorConfig, DetectorsConfig, HistoryConfig,
    LogFormat, LoggingConfig, PersistenceConfig, RotationPolicy,
};
pub use history::{HistoryBuffer, Sample, DEFAULT_HISTORY_CAPACITY};
pub use issue::{AlertPhase, Incident, IncidentLog, IssueKind, IssueState, Verdict};
pub use samples::{
    CodeGenSample, ContextBuildSample, DependencyEvent, DependencySample, MonitoredStreams,
    PatternSample, PhaseProgressSample, ProviderSample, SchemaValidationSample, StreamKind,
    TestGenSample, ValidationSample,
};
pub use scope::{
    ChildTally, Counters, FinalStatus, ModelTokens, Outcome, Scope, ScopeKind, ScopeRef,
    ScopeStatus, TimingTotals, TokenTotals, TokenUsage,
};
pub use snapshot::{ScopeSnapshot, SNAPSHOT_SCHEMA_VERSION};
