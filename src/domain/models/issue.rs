//! Detector state: detection flag, supporting statistics, incident log and
//! the alert de-duplication phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::alert::AlertSeverity;

/// Issue types monitored per PRD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CodeGenerationDegradation,
    ContextWindowInefficiency,
    TestGenerationQuality,
    ValidationGateOverBlocking,
    AiProviderInstability,
    SchemaValidationConsistency,
    PatternLearningInefficacy,
    DependencyDeadlock,
}

impl IssueKind {
    /// Event type used on the alert stream.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodeGenerationDegradation => "code_generation_degradation",
            Self::ContextWindowInefficiency => "context_window_inefficiency",
            Self::TestGenerationQuality => "test_generation_quality",
            Self::ValidationGateOverBlocking => "validation_gate_over_blocking",
            Self::AiProviderInstability => "ai_provider_instability",
            Self::SchemaValidationConsistency => "schema_validation_consistency",
            Self::PatternLearningInefficacy => "pattern_learning_inefficacy",
            Self::DependencyDeadlock => "dependency_deadlock",
        }
    }

    pub const fn severity(self) -> AlertSeverity {
        match self {
            Self::DependencyDeadlock => AlertSeverity::Critical,
            Self::AiProviderInstability | Self::CodeGenerationDegradation => AlertSeverity::Error,
            _ => AlertSeverity::Warning,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// De-duplication state per (detector, scope).
///
/// `Normal --(detected rises)--> Alerted --(explicit reset)--> Normal`.
/// There is no decay back to `Normal` when the condition clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    #[default]
    Normal,
    Alerted,
}

/// One retained anomaly occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub detected_at: DateTime<Utc>,
    pub reason: String,
    /// The statistic that breached its threshold.
    pub value: f64,
}

/// Append-only ring of incidents; oldest evicted once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentLog {
    capacity: usize,
    entries: VecDeque<Incident>,
}

impl IncidentLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, incident: Incident) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(incident);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Incident> {
        self.entries.back()
    }
}

/// Result of evaluating one detector over its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict<S> {
    pub detected: bool,
    pub stats: S,
    /// Human-readable description of the breached condition, empty when clear.
    pub reason: String,
    pub value: f64,
}

impl<S> Verdict<S> {
    pub const fn clear(stats: S) -> Self {
        Self {
            detected: false,
            stats,
            reason: String::new(),
            value: 0.0,
        }
    }
}

/// Detection state for one detector on one PRD scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueState<S> {
    pub detected: bool,
    pub stats: S,
    pub incidents: IncidentLog,
    pub alert_threshold: f64,
    pub alert_phase: AlertPhase,
    pub sample_count: usize,
    pub last_checked: Option<DateTime<Utc>>,
}

impl<S: Default> IssueState<S> {
    pub fn new(alert_threshold: f64, incident_capacity: usize) -> Self {
        Self {
            detected: false,
            stats: S::default(),
            incidents: IncidentLog::new(incident_capacity),
            alert_threshold,
            alert_phase: AlertPhase::Normal,
            sample_count: 0,
            last_checked: None,
        }
    }

    /// Re-arms the detector and drops everything learned during the run.
    pub fn reset(&mut self) {
        *self = Self::new(self.alert_threshold, self.incidents.capacity);
    }
}

impl<S> IssueState<S> {
    /// Folds a verdict into the state and reports whether an alert must fire.
    ///
    /// Statistics are always replaced. An incident is logged each time
    /// `detected` rises; the alert fires only while the phase is `Normal`.
    pub fn apply(&mut self, verdict: Verdict<S>, now: DateTime<Utc>) -> bool {
        let rising = verdict.detected && !self.detected;
        if rising {
            self.incidents.push(Incident {
                detected_at: now,
                reason: verdict.reason,
                value: verdict.value,
            });
        }
        self.detected = verdict.detected;
        self.stats = verdict.stats;
        self.last_checked = Some(now);

        if self.detected && self.alert_phase == AlertPhase::Normal {
            self.alert_phase = AlertPhase::Alerted;
            true
        } else {
            false
        }
    }

    pub fn is_alerted(&self) -> bool {
        self.alert_phase == AlertPhase::Alerted
    }
}
