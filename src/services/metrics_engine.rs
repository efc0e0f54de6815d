//! Per-PRD anomaly monitoring.
//!
//! The engine is passed explicitly through a PRD run's execution context; it
//! owns one [`PrdMonitor`] per PRD scope so parallel PRD executions in the
//! same process never share detector state. Appends and checks for one PRD
//! are serialized by that monitor's mutex; different PRDs proceed in parallel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::models::{
    CodeGenSample, Config, ContextBuildSample, DependencyEvent, DependencySample,
    DetectorConfig, DetectorsConfig, HistoryBuffer, IssueKind, IssueState, MonitoredStreams,
    PatternSample, PhaseProgressSample, ProviderSample, SchemaValidationSample, ScopeRef,
    StreamKind, TestGenSample, ValidationSample,
};
use crate::services::dependency_resolver::{DeadlockStats, DependencyResolver};
use crate::services::detectors::{
    self, AiProviderDetector, CodeGenerationDetector, CodeGenerationStats, ContextWindowDetector,
    ContextWindowStats, Detector, PatternLearningDetector, PatternLearningStats, ProviderStats,
    SchemaValidationDetector, SchemaValidationStats, TestGenerationDetector, TestGenerationStats,
    ValidationGateDetector, ValidationGateStats,
};
use crate::services::event_bus::{EventBus, PublishOptions};
use crate::services::scope_store::ScopeStore;

/// Detection state of every issue type for one PRD.
#[derive(Debug, Clone, Serialize)]
pub struct IssueBoard {
    pub code_generation: IssueState<CodeGenerationStats>,
    pub context_window: IssueState<ContextWindowStats>,
    pub test_generation: IssueState<TestGenerationStats>,
    pub validation_gate: IssueState<ValidationGateStats>,
    pub ai_provider: IssueState<ProviderStats>,
    pub schema_validation: IssueState<SchemaValidationStats>,
    pub pattern_learning: IssueState<PatternLearningStats>,
    pub deadlock: IssueState<DeadlockStats>,
}

impl IssueBoard {
    pub fn new(config: &DetectorsConfig) -> Self {
        fn state<S: Default>(config: &DetectorConfig) -> IssueState<S> {
            IssueState::new(config.alert_threshold, config.incident_capacity)
        }

        Self {
            code_generation: state(&config.code_generation),
            context_window: state(&config.context_window),
            test_generation: state(&config.test_generation),
            validation_gate: state(&config.validation_gate),
            ai_provider: state(&config.ai_provider),
            schema_validation: state(&config.schema_validation),
            pattern_learning: state(&config.pattern_learning),
            deadlock: IssueState::new(
                config.deadlock.stall_threshold_minutes,
                config.deadlock.incident_capacity,
            ),
        }
    }

    /// Re-arm every detector.
    pub fn reset(&mut self) {
        self.code_generation.reset();
        self.context_window.reset();
        self.test_generation.reset();
        self.validation_gate.reset();
        self.ai_provider.reset();
        self.schema_validation.reset();
        self.pattern_learning.reset();
        self.deadlock.reset();
    }

    /// Issue kinds currently detected.
    pub fn detected(&self) -> Vec<IssueKind> {
        [
            (IssueKind::CodeGenerationDegradation, self.code_generation.detected),
            (IssueKind::ContextWindowInefficiency, self.context_window.detected),
            (IssueKind::TestGenerationQuality, self.test_generation.detected),
            (IssueKind::ValidationGateOverBlocking, self.validation_gate.detected),
            (IssueKind::AiProviderInstability, self.ai_provider.detected),
            (IssueKind::SchemaValidationConsistency, self.schema_validation.detected),
            (IssueKind::PatternLearningInefficacy, self.pattern_learning.detected),
            (IssueKind::DependencyDeadlock, self.deadlock.detected),
        ]
        .into_iter()
        .filter_map(|(kind, detected)| detected.then_some(kind))
        .collect()
    }
}

/// Everything monitored for one PRD execution.
#[derive(Debug)]
pub struct PrdMonitor {
    pub streams: MonitoredStreams,
    pub issues: IssueBoard,
    pub structure: DependencyResolver,
}

impl PrdMonitor {
    fn new(history_capacity: usize, config: &DetectorsConfig) -> Self {
        Self {
            streams: MonitoredStreams::new(history_capacity),
            issues: IssueBoard::new(config),
            structure: DependencyResolver::new(),
        }
    }
}

/// An alert decided under the monitor lock, published after it is released.
struct PendingAlert {
    kind: IssueKind,
    payload: serde_json::Value,
}

fn pending_alert<S: Serialize>(kind: IssueKind, state: &IssueState<S>) -> PendingAlert {
    let (reason, value) = state
        .incidents
        .latest()
        .map(|incident| (incident.reason.clone(), incident.value))
        .unwrap_or_default();
    let stats = serde_json::to_value(&state.stats).unwrap_or_else(|e| {
        warn!(detector = %kind, error = %e, "failed to serialize detector stats");
        serde_json::Value::Null
    });
    PendingAlert {
        kind,
        payload: serde_json::json!({
            "kind": kind,
            "reason": reason,
            "value": value,
            "stats": stats,
            "sample_count": state.sample_count,
        }),
    }
}

/// Run one detector and fold the result into its state in place.
fn run_detector<D: Detector>(
    history: &HistoryBuffer<D::Sample>,
    state: &mut IssueState<D::Stats>,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> Option<PendingAlert> {
    let (next, fired) = detectors::check::<D>(history, state, config, now);
    *state = next;
    fired.then(|| pending_alert(D::KIND, state))
}

/// Aggregation and anomaly-detection engine.
pub struct MetricsEngine {
    store: Arc<ScopeStore>,
    bus: Arc<EventBus>,
    detectors: DetectorsConfig,
    history_capacity: usize,
    monitors: DashMap<ScopeRef, Arc<Mutex<PrdMonitor>>>,
}

impl MetricsEngine {
    pub fn new(
        store: Arc<ScopeStore>,
        bus: Arc<EventBus>,
        detectors: DetectorsConfig,
        history_capacity: usize,
    ) -> Self {
        Self {
            store,
            bus,
            detectors,
            history_capacity,
            monitors: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config, store: Arc<ScopeStore>, bus: Arc<EventBus>) -> Self {
        Self::new(
            store,
            bus,
            config.detectors.clone(),
            config.history.capacity,
        )
    }

    pub fn store(&self) -> &Arc<ScopeStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn record_code_generation(&self, prd: &ScopeRef, sample: CodeGenSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.code_generation.push(sample, now);
            run_detector::<CodeGenerationDetector>(
                &m.streams.code_generation,
                &mut m.issues.code_generation,
                &self.detectors.code_generation,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_context_build(&self, prd: &ScopeRef, sample: ContextBuildSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.context_build.push(sample, now);
            run_detector::<ContextWindowDetector>(
                &m.streams.context_build,
                &mut m.issues.context_window,
                &self.detectors.context_window,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_test_generation(&self, prd: &ScopeRef, sample: TestGenSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.test_generation.push(sample, now);
            run_detector::<TestGenerationDetector>(
                &m.streams.test_generation,
                &mut m.issues.test_generation,
                &self.detectors.test_generation,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_validation_gate(&self, prd: &ScopeRef, sample: ValidationSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.validation.push(sample, now);
            run_detector::<ValidationGateDetector>(
                &m.streams.validation,
                &mut m.issues.validation_gate,
                &self.detectors.validation_gate,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_provider_response(&self, prd: &ScopeRef, sample: ProviderSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.provider_response.push(sample, now);
            run_detector::<AiProviderDetector>(
                &m.streams.provider_response,
                &mut m.issues.ai_provider,
                &self.detectors.ai_provider,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_schema_validation(&self, prd: &ScopeRef, sample: SchemaValidationSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.schema_validation.push(sample, now);
            run_detector::<SchemaValidationDetector>(
                &m.streams.schema_validation,
                &mut m.issues.schema_validation,
                &self.detectors.schema_validation,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_pattern_learning(&self, prd: &ScopeRef, sample: PatternSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.pattern_learning.push(sample, now);
            run_detector::<PatternLearningDetector>(
                &m.streams.pattern_learning,
                &mut m.issues.pattern_learning,
                &self.detectors.pattern_learning,
                now,
            )
        });
        self.publish(prd, alert);
    }

    pub fn record_phase_progress(&self, prd: &ScopeRef, sample: PhaseProgressSample) {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            m.streams.phase_progress.push(sample, now);
            self.run_deadlock(m, now)
        });
        self.publish(prd, alert);
    }

    /// Add the edge `task -> depends_on` to the PRD's dependency graph.
    pub fn declare_dependency(&self, prd: &ScopeRef, task: &str, depends_on: &str) {
        self.dependency_event(
            prd,
            task,
            DependencyEvent::Declared {
                depends_on: depends_on.to_string(),
            },
            |structure, _| {
                structure.declare_dependency(task, depends_on);
            },
        );
    }

    pub fn remove_dependency(&self, prd: &ScopeRef, task: &str, depends_on: &str) {
        self.dependency_event(
            prd,
            task,
            DependencyEvent::Removed {
                depends_on: depends_on.to_string(),
            },
            |structure, _| {
                if !structure.remove_dependency(task, depends_on) {
                    debug!(task, depends_on, "removing undeclared dependency");
                }
            },
        );
    }

    /// Start the wait clock for `task` and count it as blocked on its scope.
    pub fn mark_blocked(&self, prd: &ScopeRef, task: &str, reason: &str) {
        let mut newly_blocked = false;
        self.dependency_event(
            prd,
            task,
            DependencyEvent::Blocked {
                reason: reason.to_string(),
            },
            |structure, now| {
                newly_blocked = structure.mark_blocked(task, reason, now);
            },
        );
        let scope = ScopeRef::task(task);
        if newly_blocked && self.store.contains(&scope) {
            self.store.record_blocked(&scope);
        }
    }

    pub fn mark_unblocked(&self, prd: &ScopeRef, task: &str) {
        let mut waited = None;
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            waited = m.structure.mark_unblocked(task, now);
            let waited_ms = waited.map_or(0, |w| w.num_milliseconds());
            m.streams.task_dependency.push(
                DependencySample {
                    task_id: task.to_string(),
                    event: DependencyEvent::Unblocked { waited_ms },
                },
                now,
            );
            self.run_deadlock(m, now)
        });
        self.publish(prd, alert);

        let scope = ScopeRef::task(task);
        if waited.is_some() && self.store.contains(&scope) {
            self.store.record_unblocked(&scope);
        }
    }

    /// Re-evaluate cycles and stalls as of `now`.
    pub fn check_deadlock(&self, prd: &ScopeRef, now: DateTime<Utc>) {
        let alert = self.with_monitor(prd, |m| self.run_deadlock(m, now));
        self.publish(prd, alert);
    }

    /// Re-evaluate every detector for the PRD as of `now`.
    pub fn check_all(&self, prd: &ScopeRef, now: DateTime<Utc>) {
        let alerts = self.with_monitor(prd, |m| {
            let config = &self.detectors;
            let streams = &m.streams;
            let issues = &mut m.issues;
            let mut alerts = vec![
                run_detector::<CodeGenerationDetector>(
                    &streams.code_generation,
                    &mut issues.code_generation,
                    &config.code_generation,
                    now,
                ),
                run_detector::<ContextWindowDetector>(
                    &streams.context_build,
                    &mut issues.context_window,
                    &config.context_window,
                    now,
                ),
                run_detector::<TestGenerationDetector>(
                    &streams.test_generation,
                    &mut issues.test_generation,
                    &config.test_generation,
                    now,
                ),
                run_detector::<ValidationGateDetector>(
                    &streams.validation,
                    &mut issues.validation_gate,
                    &config.validation_gate,
                    now,
                ),
                run_detector::<AiProviderDetector>(
                    &streams.provider_response,
                    &mut issues.ai_provider,
                    &config.ai_provider,
                    now,
                ),
                run_detector::<SchemaValidationDetector>(
                    &streams.schema_validation,
                    &mut issues.schema_validation,
                    &config.schema_validation,
                    now,
                ),
                run_detector::<PatternLearningDetector>(
                    &streams.pattern_learning,
                    &mut issues.pattern_learning,
                    &config.pattern_learning,
                    now,
                ),
            ];
            alerts.push(self.run_deadlock(m, now));
            alerts
        });
        for alert in alerts {
            self.publish(prd, alert);
        }
    }

    /// Clear every history, detector state and dependency record for the PRD
    /// and re-arm its alerts. Issued at the start of a new PRD execution.
    pub fn reset(&self, prd: &ScopeRef) {
        if let Some(monitor) = self.monitors.get(prd).map(|entry| entry.value().clone()) {
            let mut monitor = monitor.lock();
            monitor.streams.clear();
            monitor.issues.reset();
            monitor.structure.clear();
        }
        info!(prd = %prd, "monitoring state reset");
    }

    /// Copy of the PRD's detection state.
    pub fn issue_board(&self, prd: &ScopeRef) -> Option<IssueBoard> {
        let monitor = self.monitors.get(prd)?.value().clone();
        let board = monitor.lock().issues.clone();
        Some(board)
    }

    pub fn stream_len(&self, prd: &ScopeRef, stream: StreamKind) -> usize {
        self.monitors
            .get(prd)
            .map(|entry| entry.value().clone())
            .map_or(0, |monitor| monitor.lock().streams.len(stream))
    }

    pub fn monitored_prds(&self) -> Vec<ScopeRef> {
        let mut prds: Vec<ScopeRef> = self.monitors.iter().map(|e| e.key().clone()).collect();
        prds.sort();
        prds
    }

    fn dependency_event<F>(&self, prd: &ScopeRef, task: &str, event: DependencyEvent, apply: F)
    where
        F: FnOnce(&mut DependencyResolver, DateTime<Utc>),
    {
        let now = Utc::now();
        let alert = self.with_monitor(prd, |m| {
            apply(&mut m.structure, now);
            m.streams.task_dependency.push(
                DependencySample {
                    task_id: task.to_string(),
                    event,
                },
                now,
            );
            self.run_deadlock(m, now)
        });
        self.publish(prd, alert);
    }

    fn run_deadlock(&self, monitor: &mut PrdMonitor, now: DateTime<Utc>) -> Option<PendingAlert> {
        let (next, fired) = monitor.structure.check(
            &monitor.issues.deadlock,
            &self.detectors.deadlock,
            now,
            &monitor.streams.phase_progress,
        );
        monitor.issues.deadlock = next;
        fired.then(|| pending_alert(IssueKind::DependencyDeadlock, &monitor.issues.deadlock))
    }

    fn with_monitor<R>(&self, prd: &ScopeRef, f: impl FnOnce(&mut PrdMonitor) -> R) -> R {
        // Clone the Arc so the map shard lock is released before the monitor lock is taken
        let monitor = self
            .monitors
            .entry(prd.clone())
            .or_insert_with(|| {
                debug!(prd = %prd, "monitoring new PRD");
                Arc::new(Mutex::new(PrdMonitor::new(
                    self.history_capacity,
                    &self.detectors,
                )))
            })
            .value()
            .clone();
        let mut guard = monitor.lock();
        f(&mut guard)
    }

    fn publish(&self, prd: &ScopeRef, alert: Option<PendingAlert>) {
        let Some(alert) = alert else {
            return;
        };
        let event = self.bus.publish(
            alert.kind.as_str(),
            alert.payload,
            PublishOptions::new(alert.kind.severity(), prd.to_string()),
        );
        info!(
            prd = %prd,
            event_type = %event.event_type,
            sequence = event.sequence,
            "alert published"
        );
    }
}
