//! Per-scope metric categories fed by the ingestion API.
//!
//! Every category record is always fully populated (zero-valued until the
//! first event arrives), so callers never see a half-initialised sub-record.
//! Each record merges its event through a named function whose doc states the
//! per-field policy: `sum`, `max`, `overwrite` or `mean` (incremental).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::scope::TimingTotals;

/// Category identifiers used by the query side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Validation,
    FileFiltering,
    Ipc,
    Session,
    Schema,
    TestResults,
    Contribution,
}

impl MetricCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::FileFiltering => "file_filtering",
            Self::Ipc => "ipc",
            Self::Session => "session",
            Self::Schema => "schema",
            Self::TestResults => "test_results",
            Self::Contribution => "contribution",
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one validation gate run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// The gate stopped the pipeline.
    pub blocked: bool,
    /// A block that later proved unnecessary.
    pub false_positive: bool,
    pub duration_ms: f64,
}

/// Outcome of one context file-filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilterOutcome {
    pub considered: u64,
    pub included: u64,
    pub excluded: u64,
    pub missing: u64,
}

/// Outcome of one IPC connection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcOutcome {
    pub connected: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

/// Session lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started,
    Resumed,
    Ended { duration_ms: f64 },
}

/// One schema operation (validation, migration, generation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaOperation {
    pub operation: String,
    pub valid: bool,
    pub duration_ms: f64,
}

/// Results of one test-suite run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: f64,
}

/// Signal from the contribution-mode workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSignal {
    pub mode: String,
    pub weight: f64,
}

/// A single ingestion event for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum CategoryEvent {
    Validation(ValidationOutcome),
    FileFiltering(FileFilterOutcome),
    Ipc(IpcOutcome),
    Session(SessionEvent),
    Schema(SchemaOperation),
    TestResults(TestResults),
    Contribution(ContributionSignal),
}

impl CategoryEvent {
    pub const fn category(&self) -> MetricCategory {
        match self {
            Self::Validation(_) => MetricCategory::Validation,
            Self::FileFiltering(_) => MetricCategory::FileFiltering,
            Self::Ipc(_) => MetricCategory::Ipc,
            Self::Session(_) => MetricCategory::Session,
            Self::Schema(_) => MetricCategory::Schema,
            Self::TestResults(_) => MetricCategory::TestResults,
            Self::Contribution(_) => MetricCategory::Contribution,
        }
    }

    /// False when any measurement is NaN or infinite.
    ///
    /// Non-finite values would poison the running means and cannot be read
    /// back from a JSON snapshot.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Validation(outcome) => outcome.duration_ms.is_finite(),
            Self::Ipc(outcome) => outcome.latency_ms.is_finite(),
            Self::Session(SessionEvent::Ended { duration_ms }) => duration_ms.is_finite(),
            Self::Schema(operation) => operation.duration_ms.is_finite(),
            Self::TestResults(results) => results.duration_ms.is_finite(),
            Self::Contribution(signal) => signal.weight.is_finite(),
            Self::FileFiltering(_) | Self::Session(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub blocked: u64,
    pub false_positives: u64,
    pub timing: TimingTotals,
}

impl ValidationStats {
    /// Counters: sum. `timing`: mean.
    pub fn merge_outcome(&mut self, outcome: &ValidationOutcome) {
        self.total += 1;
        if outcome.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        if outcome.blocked {
            self.blocked += 1;
        }
        if outcome.false_positive {
            self.false_positives += 1;
        }
        self.timing.observe(outcome.duration_ms);
    }

    /// False positives over blocks, 0 when nothing was blocked.
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.blocked)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFilterStats {
    pub passes: u64,
    pub considered: u64,
    pub included: u64,
    pub excluded: u64,
    pub missing: u64,
    pub max_considered: u64,
}

impl FileFilterStats {
    /// All counters: sum. `max_considered`: max.
    pub fn merge_outcome(&mut self, outcome: &FileFilterOutcome) {
        self.passes += 1;
        self.considered += outcome.considered;
        self.included += outcome.included;
        self.excluded += outcome.excluded;
        self.missing += outcome.missing;
        self.max_considered = self.max_considered.max(outcome.considered);
    }

    pub fn missing_rate(&self) -> f64 {
        ratio(self.missing, self.considered)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub latency: TimingTotals,
    pub last_error: Option<String>,
}

impl IpcStats {
    /// Counters: sum. `latency`: mean. `last_error`: overwrite when present.
    pub fn merge_outcome(&mut self, outcome: &IpcOutcome) {
        self.attempts += 1;
        if outcome.connected {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.latency.observe(outcome.latency_ms);
        if let Some(error) = &outcome.error {
            self.last_error = Some(error.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    pub started: u64,
    pub resumed: u64,
    pub ended: u64,
    pub peak_active: u64,
    pub duration: TimingTotals,
}

impl SessionStats {
    /// Counters: sum. `peak_active`: max. `duration`: mean over ended sessions.
    pub fn merge_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Started => self.started += 1,
            SessionEvent::Resumed => self.resumed += 1,
            SessionEvent::Ended { duration_ms } => {
                self.ended += 1;
                self.duration.observe(*duration_ms);
            }
        }
        self.peak_active = self.peak_active.max(self.active());
    }

    pub const fn active(&self) -> u64 {
        (self.started + self.resumed).saturating_sub(self.ended)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaStats {
    pub operations: u64,
    pub failures: u64,
    pub by_operation: BTreeMap<String, u64>,
    pub timing: TimingTotals,
}

impl SchemaStats {
    /// Counters and `by_operation`: sum. `timing`: mean.
    pub fn merge_operation(&mut self, operation: &SchemaOperation) {
        self.operations += 1;
        if !operation.valid {
            self.failures += 1;
        }
        *self
            .by_operation
            .entry(operation.operation.clone())
            .or_default() += 1;
        self.timing.observe(operation.duration_ms);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestStats {
    pub runs: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub timing: TimingTotals,
}

impl TestStats {
    /// Counters: sum. `timing`: mean.
    pub fn merge_results(&mut self, results: &TestResults) {
        self.runs += 1;
        self.passed += results.passed;
        self.failed += results.failed;
        self.skipped += results.skipped;
        self.timing.observe(results.duration_ms);
    }

    /// Passed over executed (skipped excluded).
    pub fn pass_rate(&self) -> f64 {
        ratio(self.passed, self.passed + self.failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionStats {
    pub signals: u64,
    pub by_mode: BTreeMap<String, u64>,
    pub total_weight: f64,
    pub last_mode: Option<String>,
}

impl ContributionStats {
    /// `signals`, `by_mode`, `total_weight`: sum. `last_mode`: overwrite.
    pub fn merge_signal(&mut self, signal: &ContributionSignal) {
        self.signals += 1;
        *self.by_mode.entry(signal.mode.clone()).or_default() += 1;
        self.total_weight += signal.weight;
        self.last_mode = Some(signal.mode.clone());
    }
}

/// All category records of a scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMetrics {
    pub validation: ValidationStats,
    pub file_filtering: FileFilterStats,
    pub ipc: IpcStats,
    pub sessions: SessionStats,
    pub schema: SchemaStats,
    pub tests: TestStats,
    pub contribution: ContributionStats,
}

impl CategoryMetrics {
    /// Routes an event to the merge function of its category.
    pub fn apply(&mut self, event: &CategoryEvent) {
        match event {
            CategoryEvent::Validation(outcome) => self.validation.merge_outcome(outcome),
            CategoryEvent::FileFiltering(outcome) => self.file_filtering.merge_outcome(outcome),
            CategoryEvent::Ipc(outcome) => self.ipc.merge_outcome(outcome),
            CategoryEvent::Session(event) => self.sessions.merge_event(event),
            CategoryEvent::Schema(operation) => self.schema.merge_operation(operation),
            CategoryEvent::TestResults(results) => self.tests.merge_results(results),
            CategoryEvent::Contribution(signal) => self.contribution.merge_signal(signal),
        }
    }

    /// JSON view of one category, used by query surfaces.
    pub fn view(&self, category: MetricCategory) -> serde_json::Value {
        let value = match category {
            MetricCategory::Validation => serde_json::to_value(&self.validation),
            MetricCategory::FileFiltering => serde_json::to_value(&self.file_filtering),
            MetricCategory::Ipc => serde_json::to_value(&self.ipc),
            MetricCategory::Session => serde_json::to_value(&self.sessions),
            MetricCategory::Schema => serde_json::to_value(&self.schema),
            MetricCategory::TestResults => serde_json::to_value(&self.tests),
            MetricCategory::Contribution => serde_json::to_value(&self.contribution),
        };
        value.unwrap_or_default()
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
