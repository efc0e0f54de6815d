//! Scope aggregates for the nested Task → Phase → PRD → PRD-Set hierarchy.
//!
//! A [`Scope`] is one unit of work at one granularity. Counters, token totals,
//! timings and category records accumulate on the scope itself and on every
//! ancestor exactly once (roll-up). Derived values such as the success rate are
//! recomputed on every mutation and never written directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::category::CategoryMetrics;
use crate::domain::ports::PricingProvider;

/// Granularity of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Task,
    Phase,
    Prd,
    PrdSet,
}

impl ScopeKind {
    /// Kind of the parent scope, `None` for the root granularity.
    pub const fn parent_kind(self) -> Option<Self> {
        match self {
            Self::Task => Some(Self::Phase),
            Self::Phase => Some(Self::Prd),
            Self::Prd => Some(Self::PrdSet),
            Self::PrdSet => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Phase => "phase",
            Self::Prd => "prd",
            Self::PrdSet => "prd_set",
        }
    }

    /// All kinds, leaves first.
    pub const fn all() -> [Self; 4] {
        [Self::Task, Self::Phase, Self::Prd, Self::PrdSet]
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "task" => Ok(Self::Task),
            "phase" => Ok(Self::Phase),
            "prd" => Ok(Self::Prd),
            "prd_set" | "prdset" => Ok(Self::PrdSet),
            other => Err(format!(
                "unknown scope kind '{other}' (expected task, phase, prd or prd_set)"
            )),
        }
    }
}

/// Identity of a scope: identifiers are unique per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeRef {
    pub kind: ScopeKind,
    pub id: String,
}

impl ScopeRef {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Task, id)
    }

    pub fn phase(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Phase, id)
    }

    pub fn prd(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Prd, id)
    }

    pub fn prd_set(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::PrdSet, id)
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Outcome of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Lifecycle state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ScopeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status passed to `complete_scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Completed,
    Failed,
    Cancelled,
}

impl From<FinalStatus> for ScopeStatus {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Completed => Self::Completed,
            FinalStatus::Failed => Self::Failed,
            FinalStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Completion counters with a derived success rate.
///
/// Fields are private: the only way to change them is through the recording
/// methods, which recompute `success_rate` every time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CountersRecord", into = "CountersRecord")]
pub struct Counters {
    total: u64,
    completed: u64,
    failed: u64,
    blocked: u64,
    success_rate: f64,
}

impl Counters {
    pub const fn total(&self) -> u64 {
        self.total
    }

    pub const fn completed(&self) -> u64 {
        self.completed
    }

    pub const fn failed(&self) -> u64 {
        self.failed
    }

    pub const fn blocked(&self) -> u64 {
        self.blocked
    }

    /// `completed + failed`.
    pub const fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    /// `completed / (completed + failed)`, 0 when nothing finished yet.
    pub const fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.completed += 1,
            Outcome::Failure => self.failed += 1,
        }
        self.recompute();
    }

    pub fn add_total(&mut self, count: u64) {
        self.total += count;
    }

    pub fn block(&mut self) {
        self.blocked += 1;
    }

    pub fn unblock(&mut self) {
        self.blocked = self.blocked.saturating_sub(1);
    }

    fn recompute(&mut self) {
        let finished = self.finished();
        self.success_rate = if finished == 0 {
            0.0
        } else {
            self.completed as f64 / finished as f64
        };
    }
}

/// Wire form of [`Counters`]; missing fields read as zero and the rate is
/// always recomputed on load.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct CountersRecord {
    total: u64,
    completed: u64,
    failed: u64,
    blocked: u64,
    success_rate: f64,
}

impl From<CountersRecord> for Counters {
    fn from(record: CountersRecord) -> Self {
        let mut counters = Self {
            total: record.total,
            completed: record.completed,
            failed: record.failed,
            blocked: record.blocked,
            success_rate: 0.0,
        };
        counters.recompute();
        counters
    }
}

impl From<Counters> for CountersRecord {
    fn from(counters: Counters) -> Self {
        Self {
            total: counters.total,
            completed: counters.completed,
            failed: counters.failed,
            blocked: counters.blocked,
            success_rate: counters.success_rate,
        }
    }
}

/// Tally of direct child scopes started and finished under a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildTally {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl ChildTally {
    pub fn record_started(&mut self) {
        self.started += 1;
    }

    pub fn record_finished(&mut self, status: FinalStatus) {
        match status {
            FinalStatus::Completed => self.completed += 1,
            FinalStatus::Failed => self.failed += 1,
            FinalStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub const fn open(&self) -> u64 {
        self.started
            .saturating_sub(self.completed + self.failed + self.cancelled)
    }
}

/// Raw token usage reported by an AI-call wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub provider: String,
    pub model: String,
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        input: u64,
        output: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input,
            output,
        }
    }

    /// Usage without provider attribution. It is never priced.
    pub fn unattributed(input: u64, output: u64) -> Self {
        Self::new("unknown", "unknown", input, output)
    }

    fn key(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Token counts for one provider/model pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTokens {
    pub provider: String,
    pub model: String,
    pub input: u64,
    pub output: u64,
    pub cost: f64,
}

/// Accumulated token usage and its priced cost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    /// Last priced cost; only written by [`TokenTotals::apply_pricing`].
    /// Usage merged afterwards is not included until the next pricing run,
    /// see [`TokenTotals::cost_is_current`].
    pub cost: f64,
    /// Token total at the time `cost` was computed.
    pub priced_tokens: u64,
    pub by_model: BTreeMap<String, ModelTokens>,
}

impl TokenTotals {
    /// Sums input and output into the totals and the per-model breakdown.
    pub fn merge_usage(&mut self, usage: &TokenUsage) {
        self.input += usage.input;
        self.output += usage.output;
        let entry = self
            .by_model
            .entry(usage.key())
            .or_insert_with(|| ModelTokens {
                provider: usage.provider.clone(),
                model: usage.model.clone(),
                ..ModelTokens::default()
            });
        entry.input += usage.input;
        entry.output += usage.output;
    }

    /// Prices every model entry and overwrites `cost` with the sum.
    ///
    /// Entries the pricing collaborator does not know, or prices as NaN or
    /// infinite, cost nothing.
    pub fn apply_pricing(&mut self, pricing: &dyn PricingProvider) -> f64 {
        let mut total = 0.0;
        for entry in self.by_model.values_mut() {
            entry.cost = pricing
                .cost(&entry.provider, &entry.model, entry.input, entry.output)
                .filter(|cost| cost.is_finite())
                .unwrap_or(0.0);
            total += entry.cost;
        }
        self.cost = total;
        self.priced_tokens = self.total();
        total
    }

    /// True when no usage was merged since `cost` was last computed.
    pub const fn cost_is_current(&self) -> bool {
        self.priced_tokens == self.total()
    }

    pub const fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Running timing totals for one named category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingTotals {
    pub total_ms: f64,
    pub count: u64,
    pub avg_ms: f64,
}

impl TimingTotals {
    /// Adds one sample, updating the mean incrementally:
    /// `avg += (ms - avg) / count`.
    pub fn observe(&mut self, ms: f64) {
        self.total_ms += ms;
        self.count += 1;
        self.avg_ms += (ms - self.avg_ms) / self.count as f64;
    }
}

/// One aggregation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
    #[serde(default)]
    pub parent: Option<ScopeRef>,
    #[serde(default)]
    pub status: ScopeStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub children: ChildTally,
    #[serde(default)]
    pub tokens: TokenTotals,
    #[serde(default)]
    pub timings: BTreeMap<String, TimingTotals>,
    #[serde(default)]
    pub categories: CategoryMetrics,
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl Scope {
    pub fn new(
        kind: ScopeKind,
        id: impl Into<String>,
        parent: Option<ScopeRef>,
        metadata: BTreeMap<String, String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            parent,
            status: ScopeStatus::InProgress,
            metadata,
            counters: Counters::default(),
            children: ChildTally::default(),
            tokens: TokenTotals::default(),
            timings: BTreeMap::new(),
            categories: CategoryMetrics::default(),
            started_at,
            ended_at: None,
            duration_ms: None,
        }
    }

    pub fn key(&self) -> ScopeRef {
        ScopeRef::new(self.kind, self.id.clone())
    }

    /// Completed scopes no longer accept mutations.
    pub fn is_frozen(&self) -> bool {
        self.status != ScopeStatus::InProgress
    }

    /// Get-or-create accessor for a timing category.
    pub fn timing_mut(&mut self, category: &str) -> &mut TimingTotals {
        self.timings.entry(category.to_string()).or_default()
    }

    pub fn timing(&self, category: &str) -> TimingTotals {
        self.timings.get(category).copied().unwrap_or_default()
    }

    pub fn complete(&mut self, status: FinalStatus, ended_at: DateTime<Utc>) {
        self.status = status.into();
        self.ended_at = Some(ended_at);
        self.duration_ms = Some((ended_at - self.started_at).num_milliseconds());
    }
}
