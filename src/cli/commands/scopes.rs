use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{output, percent, CommandOutput};
use crate::cli::table::TableFormatter;
use crate::domain::models::{Scope, ScopeKind, ScopeSnapshot};
use crate::domain::ports::SnapshotRepository;
use crate::infrastructure::persistence::JsonSnapshotRepository;
use crate::services::cost_tracker::format_summary;

async fn load_snapshot(path: &Path) -> Result<ScopeSnapshot> {
    JsonSnapshotRepository::new(path)
        .load()
        .await
        .with_context(|| format!("Failed to load snapshot from {}", path.display()))
}

#[derive(Debug, Serialize)]
pub struct ScopeListOutput {
    pub scopes: Vec<Scope>,
    pub total: usize,
}

impl CommandOutput for ScopeListOutput {
    fn to_human(&self) -> String {
        if self.scopes.is_empty() {
            return "No scopes found.".to_string();
        }
        let rows: Vec<&Scope> = self.scopes.iter().collect();
        let mut s = format!("Scopes:\n{}", TableFormatter::new().format_scopes(&rows));
        s.push_str(&format!("\n\nShowing {} of {} scope(s)", self.scopes.len(), self.total));
        s
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Select scopes of `kind` (all kinds when `None`), ordered by kind then id.
pub fn select_scopes(
    snapshot: &ScopeSnapshot,
    kind: Option<ScopeKind>,
    limit: usize,
) -> ScopeListOutput {
    let mut matching: Vec<&Scope> = snapshot
        .scopes
        .iter()
        .filter(|scope| kind.is_none_or(|k| scope.kind == k))
        .collect();
    matching.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));

    ScopeListOutput {
        total: matching.len(),
        scopes: matching.into_iter().take(limit).cloned().collect(),
    }
}

/// Handle scopes list command
pub async fn handle_list(
    snapshot_path: &Path,
    kind: Option<ScopeKind>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path).await?;
    output(&select_scopes(&snapshot, kind, limit), json);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ScopeDetailOutput {
    #[serde(flatten)]
    pub scope: Scope,
}

impl CommandOutput for ScopeDetailOutput {
    fn to_human(&self) -> String {
        let scope = &self.scope;
        let counters = &scope.counters;
        let mut lines = vec![
            "Scope Details:".to_string(),
            format!("  Kind: {}", scope.kind),
            format!("  ID: {}", scope.id),
            format!("  Status: {}", scope.status),
        ];
        if let Some(parent) = &scope.parent {
            lines.push(format!("  Parent: {parent}"));
        }
        lines.push(format!(
            "  Started at: {}",
            scope.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(ended_at) = scope.ended_at {
            lines.push(format!("  Ended at: {}", ended_at.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let Some(duration_ms) = scope.duration_ms {
            lines.push(format!("  Duration: {:.1}s", duration_ms as f64 / 1000.0));
        }

        lines.push(String::new());
        lines.push("Counters:".to_string());
        lines.push(format!(
            "  Total: {}  Completed: {}  Failed: {}  Blocked: {}",
            counters.total(),
            counters.completed(),
            counters.failed(),
            counters.blocked()
        ));
        lines.push(format!("  Success rate: {}", percent(counters.success_rate())));
        if scope.children.started > 0 {
            lines.push(format!(
                "  Children: {} started, {} completed, {} failed, {} cancelled",
                scope.children.started,
                scope.children.completed,
                scope.children.failed,
                scope.children.cancelled
            ));
        }

        lines.push(String::new());
        lines.push(format_summary(&scope.tokens));

        if !scope.timings.is_empty() {
            lines.push(String::new());
            lines.push("Timings:".to_string());
            for (category, timing) in &scope.timings {
                lines.push(format!(
                    "  {category}: {} samples, avg {:.1}ms",
                    timing.count, timing.avg_ms
                ));
            }
        }

        let categories = &scope.categories;
        if categories.validation.total > 0 || categories.tests.runs > 0 {
            lines.push(String::new());
            lines.push("Quality:".to_string());
            if categories.validation.total > 0 {
                lines.push(format!(
                    "  Validation: {} passed, {} blocked, {} false positive ({})",
                    categories.validation.passed,
                    categories.validation.blocked,
                    categories.validation.false_positives,
                    percent(categories.validation.false_positive_rate())
                ));
            }
            if categories.tests.runs > 0 {
                lines.push(format!(
                    "  Tests: {} runs, pass rate {}",
                    categories.tests.runs,
                    percent(categories.tests.pass_rate())
                ));
            }
        }

        if !scope.metadata.is_empty() {
            lines.push(String::new());
            lines.push("Metadata:".to_string());
            for (key, value) in &scope.metadata {
                lines.push(format!("  {key}: {value}"));
            }
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.scope).unwrap_or_default()
    }
}

/// Handle scopes show command
pub async fn handle_show(snapshot_path: &Path, kind: ScopeKind, id: &str, json: bool) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path).await?;
    let scope = snapshot.find(kind, id).cloned().ok_or_else(|| {
        anyhow::anyhow!(
            "Scope {kind}:{id} not found. Use 'overwatch scopes list' to see available scopes."
        )
    })?;

    output(&ScopeDetailOutput { scope }, json);
    Ok(())
}
