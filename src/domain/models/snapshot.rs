//! Persisted form of the scope store.
//!
//! Readers tolerate missing optional fields: anything absent is replaced by a
//! zero-valued default so older snapshots keep loading as the schema grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::{Scope, ScopeKind};

/// Current snapshot schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Immutable copy of every scope at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSnapshot {
    pub schema_version: u32,
    pub taken_at: DateTime<Utc>,
    pub scopes: Vec<Scope>,
}

impl Default for ScopeSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            taken_at: Utc::now(),
            scopes: Vec::new(),
        }
    }
}

impl ScopeSnapshot {
    pub fn new(scopes: Vec<Scope>, taken_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            taken_at,
            scopes,
        }
    }

    pub fn find(&self, kind: ScopeKind, id: &str) -> Option<&Scope> {
        self.scopes
            .iter()
            .find(|scope| scope.kind == kind && scope.id == id)
    }

    pub fn of_kind(&self, kind: ScopeKind) -> impl Iterator<Item = &Scope> {
        self.scopes.iter().filter(move |scope| scope.kind == kind)
    }

    /// Drops finished scopes that ended before `cutoff`; returns how many.
    ///
    /// In-progress scopes are always kept.
    pub fn prune_completed_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.scopes.len();
        self.scopes
            .retain(|scope| scope.ended_at.is_none_or(|ended| ended >= cutoff));
        before - self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::scope::FinalStatus;
    use chrono::Duration;
    use std::collections::BTreeMap;

    #[test]
    fn test_prune_keeps_open_and_recent() {
        let now = Utc::now();
        let mut old = Scope::new(ScopeKind::Task, "old", None, BTreeMap::new(), now);
        old.complete(FinalStatus::Completed, now - Duration::days(40));
        let mut recent = Scope::new(ScopeKind::Task, "recent", None, BTreeMap::new(), now);
        recent.complete(FinalStatus::Failed, now - Duration::days(1));
        let open = Scope::new(ScopeKind::Phase, "open", None, BTreeMap::new(), now);

        let mut snapshot = ScopeSnapshot::new(vec![old, recent, open], now);
        let pruned = snapshot.prune_completed_before(now - Duration::days(30));
        assert_eq!(pruned, 1);
        assert!(snapshot.find(ScopeKind::Task, "old").is_none());
        assert!(snapshot.find(ScopeKind::Task, "recent").is_some());
        assert_eq!(snapshot.of_kind(ScopeKind::Phase).count(), 1);
    }

    #[test]
    fn test_minimal_document_loads_with_defaults() {
        let json = r#"{"scopes": [{"kind": "prd", "id": "p1"}]}"#;
        let snapshot: ScopeSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
        let scope = snapshot.find(ScopeKind::Prd, "p1").unwrap();
        assert_eq!(scope.counters.finished(), 0);
        assert!(scope.timings.is_empty());
        assert!(scope.parent.is_none());
    }
}
