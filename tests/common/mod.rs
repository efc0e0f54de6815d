//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use std::path::PathBuf;
use std::sync::Arc;

use overwatch::domain::models::{AlertEvent, Config, ScopeKind, ScopeRef};
use overwatch::domain::ports::AlertListener;
use overwatch::services::{EventBus, MetricsEngine, ScopeStore};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Path of a snapshot file inside a fresh temp directory.
#[allow(dead_code)]
pub fn temp_snapshot_path() -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let path = dir.path().join("state/scopes.json");
    (dir, path)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
#[allow(dead_code)]
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    predicate()
}

/// Engine with default config and fresh store and bus.
#[allow(dead_code)]
pub fn engine() -> MetricsEngine {
    MetricsEngine::from_config(
        &Config::default(),
        Arc::new(ScopeStore::new()),
        Arc::new(EventBus::default()),
    )
}

/// One PRD set, one PRD, `phases` phases with `tasks_per_phase` tasks each.
///
/// Ids: `set`, `prd`, `phase-{p}`, `task-{p}-{t}`. Returns the task refs.
#[allow(dead_code)]
pub fn build_hierarchy(store: &ScopeStore, phases: usize, tasks_per_phase: usize) -> Vec<ScopeRef> {
    store
        .start_scope(ScopeKind::PrdSet, "set", None, Default::default())
        .expect("prd set");
    store
        .start_scope(ScopeKind::Prd, "prd", Some("set"), Default::default())
        .expect("prd");

    let mut tasks = Vec::new();
    for p in 0..phases {
        let phase_id = format!("phase-{p}");
        store
            .start_scope(ScopeKind::Phase, phase_id.as_str(), Some("prd"), Default::default())
            .expect("phase");
        for t in 0..tasks_per_phase {
            let task = store
                .start_scope(
                    ScopeKind::Task,
                    format!("task-{p}-{t}"),
                    Some(phase_id.as_str()),
                    Default::default(),
                )
                .expect("task");
            tasks.push(task);
        }
    }
    tasks
}

/// Listener that records every alert it receives.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingListener {
    pub events: Mutex<Vec<AlertEvent>>,
}

impl AlertListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_alert(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
