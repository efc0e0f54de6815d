//! In-memory scope tree with roll-up aggregation.
//!
//! Scopes live in a sharded concurrent map, so mutations on distinct scopes
//! never contend on a global lock. A roll-up walks the parent chain and locks
//! one entry at a time; increments are commutative, so concurrent siblings
//! folding into a shared ancestor produce the same aggregate in any order.
//!
//! Mutations hold the shared side of `gate`; [`ScopeStore::snapshot`] holds the
//! exclusive side, so a snapshot never observes a roll-up half applied.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::domain::error::ScopeError;
use crate::domain::models::{
    CategoryEvent, ContributionSignal, FileFilterOutcome, FinalStatus, IpcOutcome, Outcome,
    SchemaOperation, Scope, ScopeKind, ScopeRef, ScopeSnapshot, SessionEvent, TestResults,
    TokenUsage, ValidationOutcome,
};
use crate::domain::ports::{PricingProvider, SnapshotRepository};

/// Owner of every scope record for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: DashMap<ScopeRef, Scope>,
    gate: RwLock<()>,
    dirty: AtomicBool,
    dirty_notify: Notify,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted snapshot.
    pub fn from_snapshot(snapshot: ScopeSnapshot) -> Self {
        let store = Self::new();
        for scope in snapshot.scopes {
            store.scopes.insert(scope.key(), scope);
        }
        store
    }

    /// Load the persisted snapshot, falling back to an empty store when the
    /// document cannot be read or parsed.
    pub async fn restore(repository: &dyn SnapshotRepository) -> Self {
        match repository.load().await {
            Ok(snapshot) => {
                info!(scopes = snapshot.scopes.len(), "restored scope snapshot");
                Self::from_snapshot(snapshot)
            }
            Err(e) => {
                error!(error = %e, "failed to load scope snapshot, starting empty");
                Self::new()
            }
        }
    }

    /// Create a zero-valued scope.
    ///
    /// The parent, if any, is a scope of the next coarser kind. Starting a
    /// Task adds one to `total` on the task and every ancestor.
    pub fn start_scope(
        &self,
        kind: ScopeKind,
        id: impl Into<String>,
        parent_id: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Result<ScopeRef, ScopeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ScopeError::EmptyId);
        }
        let parent = match (parent_id, kind.parent_kind()) {
            (None, _) => None,
            (Some(parent_id), Some(parent_kind)) => Some(ScopeRef::new(parent_kind, parent_id)),
            (Some(parent_id), None) => {
                return Err(ScopeError::InvalidParent {
                    kind,
                    parent_id: parent_id.to_string(),
                })
            }
        };

        let key = ScopeRef::new(kind, id.clone());
        let _gate = self.gate.read_recursive();
        match self.scopes.entry(key.clone()) {
            Entry::Occupied(_) => return Err(ScopeError::DuplicateScope(key)),
            Entry::Vacant(slot) => {
                slot.insert(Scope::new(kind, id, parent.clone(), metadata, Utc::now()));
            }
        }

        if let Some(parent) = &parent {
            match self.scopes.get_mut(parent) {
                Some(mut parent_scope) => parent_scope.children.record_started(),
                None => warn!(scope = %key, parent = %parent, "parent scope not started yet"),
            }
        }
        if kind == ScopeKind::Task {
            self.walk_up(&key, |scope| scope.counters.add_total(1));
        }

        self.mark_dirty();
        debug!(scope = %key, "scope started");
        Ok(key)
    }

    /// Count one finished unit of work on the scope and every ancestor.
    pub fn record_completion(&self, scope: &ScopeRef, outcome: Outcome) {
        self.apply_upwards(scope, "record_completion", |s| s.counters.record(outcome));
    }

    /// Accumulate unattributed token usage.
    pub fn record_tokens(&self, scope: &ScopeRef, input: u64, output: u64) {
        self.record_token_usage(scope, &TokenUsage::unattributed(input, output));
    }

    /// Accumulate token usage attributed to a provider and model.
    pub fn record_token_usage(&self, scope: &ScopeRef, usage: &TokenUsage) {
        self.apply_upwards(scope, "record_tokens", |s| s.tokens.merge_usage(usage));
    }

    /// Add one timing sample to a named category.
    ///
    /// NaN and infinite samples are dropped with a warning.
    pub fn record_timing(&self, scope: &ScopeRef, category: &str, ms: f64) {
        if !ms.is_finite() {
            warn!(scope = %scope, category, ms, "ignoring non-finite timing sample");
            return;
        }
        self.apply_upwards(scope, "record_timing", |s| s.timing_mut(category).observe(ms));
    }

    /// Merge one category event; events carrying NaN or infinite
    /// measurements are dropped with a warning.
    pub fn record_category(&self, scope: &ScopeRef, event: &CategoryEvent) {
        if !event.is_finite() {
            warn!(scope = %scope, category = %event.category(), "ignoring event with non-finite measurement");
            return;
        }
        self.apply_upwards(scope, event.category().as_str(), |s| {
            s.categories.apply(event);
        });
    }

    pub fn record_validation(&self, scope: &ScopeRef, outcome: ValidationOutcome) {
        self.record_category(scope, &CategoryEvent::Validation(outcome));
    }

    pub fn record_file_filtering(&self, scope: &ScopeRef, outcome: FileFilterOutcome) {
        self.record_category(scope, &CategoryEvent::FileFiltering(outcome));
    }

    pub fn record_ipc(&self, scope: &ScopeRef, outcome: IpcOutcome) {
        self.record_category(scope, &CategoryEvent::Ipc(outcome));
    }

    pub fn record_session(&self, scope: &ScopeRef, event: SessionEvent) {
        self.record_category(scope, &CategoryEvent::Session(event));
    }

    pub fn record_schema(&self, scope: &ScopeRef, operation: SchemaOperation) {
        self.record_category(scope, &CategoryEvent::Schema(operation));
    }

    pub fn record_test_results(&self, scope: &ScopeRef, results: TestResults) {
        self.record_category(scope, &CategoryEvent::TestResults(results));
    }

    pub fn record_contribution(&self, scope: &ScopeRef, signal: ContributionSignal) {
        self.record_category(scope, &CategoryEvent::Contribution(signal));
    }

    pub fn record_blocked(&self, scope: &ScopeRef) {
        self.apply_upwards(scope, "record_blocked", |s| s.counters.block());
    }

    pub fn record_unblocked(&self, scope: &ScopeRef) {
        self.apply_upwards(scope, "record_unblocked", |s| s.counters.unblock());
    }

    /// Freeze the scope, stamp its end time, and tally it on the parent.
    pub fn complete_scope(&self, scope: &ScopeRef, status: FinalStatus) {
        let _gate = self.gate.read_recursive();
        let parent = {
            let Some(mut record) = self.scopes.get_mut(scope) else {
                warn!(scope = %scope, "complete_scope on unknown scope ignored");
                return;
            };
            if record.is_frozen() {
                warn!(scope = %scope, status = %record.status, "scope already completed");
                return;
            }
            record.complete(status, Utc::now());
            record.parent.clone()
        };

        if let Some(parent) = parent {
            if let Some(mut parent_scope) = self.scopes.get_mut(&parent) {
                parent_scope.children.record_finished(status);
            }
        }

        self.mark_dirty();
        debug!(scope = %scope, ?status, "scope completed");
    }

    /// Price the scope's token usage and store the result in `tokens.cost`.
    pub fn compute_cost(&self, scope: &ScopeRef, pricing: &dyn PricingProvider) -> Option<f64> {
        let _gate = self.gate.read_recursive();
        let Some(mut record) = self.scopes.get_mut(scope) else {
            warn!(scope = %scope, "compute_cost on unknown scope ignored");
            return None;
        };
        let cost = record.tokens.apply_pricing(pricing);
        drop(record);
        self.mark_dirty();
        Some(cost)
    }

    pub fn get(&self, scope: &ScopeRef) -> Option<Scope> {
        self.scopes.get(scope).map(|record| record.clone())
    }

    pub fn get_scope(&self, kind: ScopeKind, id: &str) -> Option<Scope> {
        self.get(&ScopeRef::new(kind, id))
    }

    pub fn contains(&self, scope: &ScopeRef) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Scopes ordered by kind then id, optionally filtered by kind.
    pub fn list_scopes(&self, kind: Option<ScopeKind>) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self
            .scopes
            .iter()
            .filter(|entry| kind.is_none_or(|kind| entry.key().kind == kind))
            .map(|entry| entry.value().clone())
            .collect();
        scopes.sort_by(|a, b| a.key().cmp(&b.key()));
        scopes
    }

    /// Consistent copy of the whole store.
    pub fn snapshot(&self) -> ScopeSnapshot {
        let _gate = self.gate.write();
        let mut scopes: Vec<Scope> = self
            .scopes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        scopes.sort_by(|a, b| a.key().cmp(&b.key()));
        ScopeSnapshot::new(scopes, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Set the dirty flag without waking the flusher; used to retry a failed
    /// flush on the next tick.
    pub fn restore_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Resolves after the next mutation marks the store dirty.
    pub async fn dirtied(&self) {
        self.dirty_notify.notified().await;
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.dirty_notify.notify_one();
    }

    /// Apply `op` to the scope and each ancestor; unknown or frozen target
    /// scopes are logged and skipped.
    fn apply_upwards<F>(&self, scope: &ScopeRef, operation: &str, op: F)
    where
        F: FnMut(&mut Scope),
    {
        let _gate = self.gate.read_recursive();
        match self.scopes.get(scope) {
            None => {
                warn!(scope = %scope, operation, "ignoring record on unknown scope");
                return;
            }
            Some(record) if record.is_frozen() => {
                warn!(scope = %scope, operation, "ignoring record on completed scope");
                return;
            }
            Some(_) => {}
        }
        self.walk_up(scope, op);
        self.mark_dirty();
    }

    /// Visit the scope and its ancestors, holding at most one entry lock at a
    /// time. Frozen ancestors are skipped but the walk continues upward.
    fn walk_up<F>(&self, scope: &ScopeRef, mut op: F)
    where
        F: FnMut(&mut Scope),
    {
        let mut current = Some(scope.clone());
        while let Some(key) = current.take() {
            let Some(mut record) = self.scopes.get_mut(&key) else {
                debug!(scope = %key, "ancestor not present, roll-up stops");
                break;
            };
            if record.is_frozen() {
                debug!(scope = %key, "skipping completed ancestor");
            } else {
                op(&mut record);
            }
            current = record.parent.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy(store: &ScopeStore) -> (ScopeRef, ScopeRef, ScopeRef) {
        let prd = store
            .start_scope(ScopeKind::Prd, "prd-1", None, BTreeMap::new())
            .unwrap();
        let phase = store
            .start_scope(ScopeKind::Phase, "phase-1", Some("prd-1"), BTreeMap::new())
            .unwrap();
        let task = store
            .start_scope(ScopeKind::Task, "task-1", Some("phase-1"), BTreeMap::new())
            .unwrap();
        (prd, phase, task)
    }

    #[test]
    fn test_duplicate_scope_rejected_per_kind() {
        let store = ScopeStore::new();
        store
            .start_scope(ScopeKind::Task, "x", None, BTreeMap::new())
            .unwrap();
        let err = store
            .start_scope(ScopeKind::Task, "x", None, BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, ScopeError::DuplicateScope(ScopeRef::task("x")));
        // Same id under another kind is a different scope.
        assert!(store
            .start_scope(ScopeKind::Phase, "x", None, BTreeMap::new())
            .is_ok());
    }

    #[test]
    fn test_prd_set_cannot_have_parent() {
        let store = ScopeStore::new();
        let err = store
            .start_scope(ScopeKind::PrdSet, "s", Some("other"), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ScopeError::InvalidParent { .. }));
        assert_eq!(
            store.start_scope(ScopeKind::Task, "", None, BTreeMap::new()),
            Err(ScopeError::EmptyId)
        );
    }

    #[test]
    fn test_completion_rolls_up_once_per_ancestor() {
        let store = ScopeStore::new();
        let (prd, phase, task) = hierarchy(&store);

        store.record_completion(&task, Outcome::Success);
        store.record_completion(&task, Outcome::Failure);

        for key in [&task, &phase, &prd] {
            let scope = store.get(key).unwrap();
            assert_eq!(scope.counters.completed(), 1, "{key}");
            assert_eq!(scope.counters.failed(), 1, "{key}");
            assert!((scope.counters.success_rate() - 0.5).abs() < f64::EPSILON);
            assert_eq!(scope.counters.total(), 1);
        }
    }

    #[test]
    fn test_unknown_scope_is_noop() {
        let store = ScopeStore::new();
        store.record_completion(&ScopeRef::task("ghost"), Outcome::Success);
        store.record_timing(&ScopeRef::task("ghost"), "llm", 10.0);
        store.complete_scope(&ScopeRef::task("ghost"), FinalStatus::Completed);
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_timing_and_tokens_roll_up() {
        let store = ScopeStore::new();
        let (prd, _, task) = hierarchy(&store);
        store.record_timing(&task, "llm", 100.0);
        store.record_timing(&task, "llm", 300.0);
        store.record_tokens(&task, 1000, 200);

        let prd_scope = store.get(&prd).unwrap();
        let timing = prd_scope.timing("llm");
        assert_eq!(timing.count, 2);
        assert!((timing.avg_ms - 200.0).abs() < 1e-9);
        assert_eq!(prd_scope.tokens.input, 1000);
        assert_eq!(prd_scope.tokens.output, 200);
    }

    #[test]
    fn test_non_finite_measurements_dropped() {
        let store = ScopeStore::new();
        let (prd, _, task) = hierarchy(&store);
        store.record_timing(&task, "llm", 40.0);
        store.take_dirty();

        store.record_timing(&task, "llm", f64::NAN);
        store.record_timing(&task, "llm", f64::INFINITY);
        store.record_validation(
            &task,
            ValidationOutcome {
                passed: true,
                blocked: false,
                false_positive: false,
                duration_ms: f64::NEG_INFINITY,
            },
        );
        store.record_contribution(
            &task,
            ContributionSignal {
                mode: "pair".to_string(),
                weight: f64::NAN,
            },
        );
        assert!(!store.is_dirty());

        let prd_scope = store.get(&prd).unwrap();
        let timing = prd_scope.timing("llm");
        assert_eq!(timing.count, 1);
        assert!((timing.avg_ms - 40.0).abs() < 1e-9);
        assert_eq!(prd_scope.categories.validation.total, 0);
        assert_eq!(prd_scope.categories.contribution.signals, 0);
    }

    #[test]
    fn test_complete_scope_freezes_and_tallies_parent() {
        let store = ScopeStore::new();
        let (_, phase, task) = hierarchy(&store);
        store.complete_scope(&task, FinalStatus::Failed);
        store.record_completion(&task, Outcome::Success);

        let task_scope = store.get(&task).unwrap();
        assert!(task_scope.is_frozen());
        assert!(task_scope.ended_at.is_some());
        assert_eq!(task_scope.counters.finished(), 0);

        let phase_scope = store.get(&phase).unwrap();
        assert_eq!(phase_scope.children.started, 1);
        assert_eq!(phase_scope.children.failed, 1);
        assert_eq!(phase_scope.children.open(), 0);
    }

    #[test]
    fn test_category_records_roll_up() {
        let store = ScopeStore::new();
        let (prd, _, task) = hierarchy(&store);
        store.record_test_results(
            &task,
            TestResults {
                passed: 3,
                failed: 1,
                skipped: 0,
                duration_ms: 20.0,
            },
        );
        store.record_session(&task, SessionEvent::Started);
        let prd_scope = store.get(&prd).unwrap();
        assert_eq!(prd_scope.categories.tests.passed, 3);
        assert_eq!(prd_scope.categories.sessions.started, 1);
    }

    #[test]
    fn test_blocked_counter_rolls_up() {
        let store = ScopeStore::new();
        let (_, phase, task) = hierarchy(&store);
        store.record_blocked(&task);
        assert_eq!(store.get(&phase).unwrap().counters.blocked(), 1);
        store.record_unblocked(&task);
        assert_eq!(store.get(&phase).unwrap().counters.blocked(), 0);
    }

    #[test]
    fn test_compute_cost() {
        let store = ScopeStore::new();
        let (_, _, task) = hierarchy(&store);
        store.record_token_usage(&task, &TokenUsage::new("anthropic", "m", 2_000_000, 0));
        let pricing = |_: &str, _: &str, input: u64, _: u64| Some(input as f64 / 1_000_000.0);
        assert_eq!(store.compute_cost(&task, &pricing), Some(2.0));
        assert!((store.get(&task).unwrap().tokens.cost - 2.0).abs() < f64::EPSILON);
        assert_eq!(store.compute_cost(&ScopeRef::task("nope"), &pricing), None);
    }

    #[test]
    fn test_dirty_flag() {
        let store = ScopeStore::new();
        assert!(!store.take_dirty());
        hierarchy(&store);
        assert!(store.take_dirty());
        assert!(!store.take_dirty());
        store.restore_dirty();
        assert!(store.is_dirty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = ScopeStore::new();
        let (_, _, task) = hierarchy(&store);
        store.record_completion(&task, Outcome::Success);
        store.record_timing(&task, "validate", 12.5);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.scopes.len(), 3);
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = ScopeStore::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.list_scopes(None), store.list_scopes(None));
        assert_eq!(restored.list_scopes(Some(ScopeKind::Task)).len(), 1);
    }
}
