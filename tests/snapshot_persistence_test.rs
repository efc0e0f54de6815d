//! Snapshot persistence through the background flusher and the JSON repository.

mod common;

use std::sync::Arc;
use std::time::Duration;

use overwatch::domain::models::{
    FinalStatus, Outcome, PersistenceConfig, ScopeKind, ScopeRef, SessionEvent, TestResults,
    ValidationOutcome,
};
use overwatch::domain::ports::SnapshotRepository;
use overwatch::infrastructure::persistence::JsonSnapshotRepository;
use overwatch::services::{FlushOutcome, ScopeStore, SnapshotFlusher, SnapshotFlusherConfig};

fn fast() -> SnapshotFlusherConfig {
    SnapshotFlusherConfig {
        flush_interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_restart_restores_rolled_up_state() {
    let (_dir, path) = common::temp_snapshot_path();
    let repository = Arc::new(JsonSnapshotRepository::new(&path));

    let store = Arc::new(ScopeStore::new());
    let handle = SnapshotFlusher::new(store.clone(), repository.clone(), fast()).spawn();

    let tasks = common::build_hierarchy(&store, 2, 2);
    store.record_completion(&tasks[0], Outcome::Success);
    store.record_completion(&tasks[1], Outcome::Failure);
    store.record_completion(&tasks[2], Outcome::Success);
    store.record_tokens(&tasks[3], 1_200, 300);
    store.record_validation(
        &tasks[0],
        ValidationOutcome {
            passed: false,
            blocked: true,
            false_positive: true,
            duration_ms: 40.0,
        },
    );
    store.record_test_results(
        &tasks[2],
        TestResults {
            passed: 8,
            failed: 2,
            skipped: 0,
            duration_ms: 900.0,
        },
    );
    store.complete_scope(&tasks[0], FinalStatus::Completed);

    let status = handle.shutdown().await;
    assert!(status.total_flushes >= 1);
    assert_eq!(status.failed_flushes, 0);

    let restored = ScopeStore::restore(repository.as_ref()).await;
    assert_eq!(restored.len(), store.len());

    let prd = restored.get(&ScopeRef::prd("prd")).unwrap();
    assert_eq!(prd.counters.total(), 4);
    assert_eq!(prd.counters.completed(), 2);
    assert_eq!(prd.counters.failed(), 1);
    assert!((prd.counters.success_rate() - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(prd.tokens.input, 1_200);
    assert_eq!(prd.categories.validation.false_positives, 1);
    assert_eq!(prd.categories.tests.passed, 8);

    let task = restored.get(&tasks[0]).unwrap();
    assert!(task.is_frozen());
    assert!(task.ended_at.is_some());

    // Restored records keep rolling up
    restored.record_completion(&tasks[3], Outcome::Success);
    let set = restored.get_scope(ScopeKind::PrdSet, "set").unwrap();
    assert_eq!(set.counters.completed(), 3);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let (_dir, path) = common::temp_snapshot_path();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"[[[ truncated").await.unwrap();

    let repository = JsonSnapshotRepository::new(&path);
    assert!(repository.load().await.is_err());

    let store = ScopeStore::restore(&repository).await;
    assert!(store.is_empty());

    // The next save replaces the corrupt document
    store
        .start_scope(ScopeKind::Prd, "fresh", None, Default::default())
        .unwrap();
    repository.save(&store.snapshot()).await.unwrap();
    let reloaded = repository.load().await.unwrap();
    assert!(reloaded.find(ScopeKind::Prd, "fresh").is_some());
}

#[tokio::test]
async fn test_flush_now_and_status() {
    let (_dir, path) = common::temp_snapshot_path();
    let repository = Arc::new(JsonSnapshotRepository::new(&path));
    let store = Arc::new(ScopeStore::new());
    let handle = SnapshotFlusher::new(store.clone(), repository, fast()).spawn();

    assert_eq!(handle.flush_now().await, FlushOutcome::Saved);
    assert!(path.exists());

    store
        .start_scope(ScopeKind::Prd, "p1", None, Default::default())
        .unwrap();
    let mut written = false;
    for _ in 0..100 {
        let bytes = tokio::fs::read(&path).await.unwrap();
        if String::from_utf8_lossy(&bytes).contains("\"p1\"") {
            written = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(written, "background flush should pick up the new scope");

    let status = handle.status().await;
    assert!(status.running);
    assert!(status.last_flush.is_some());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_repository_from_config_applies_retention() {
    let (_dir, path) = common::temp_snapshot_path();
    let config = PersistenceConfig {
        snapshot_path: path.clone(),
        retention_days: 1,
        ..PersistenceConfig::default()
    };
    let repository = JsonSnapshotRepository::from_config(&config);

    let store = ScopeStore::new();
    let task = store
        .start_scope(ScopeKind::Task, "t1", None, Default::default())
        .unwrap();
    store.complete_scope(&task, FinalStatus::Completed);
    store
        .start_scope(ScopeKind::Task, "t2", None, Default::default())
        .unwrap();

    // Just finished scopes are inside the retention window
    repository.save(&store.snapshot()).await.unwrap();
    let loaded = repository.load().await.unwrap();
    assert_eq!(loaded.scopes.len(), 2);
}

#[tokio::test]
async fn test_non_finite_timing_does_not_break_restore() {
    let (_dir, path) = common::temp_snapshot_path();
    let repository = JsonSnapshotRepository::new(&path);

    let store = ScopeStore::new();
    let task = store
        .start_scope(ScopeKind::Task, "t1", None, Default::default())
        .unwrap();
    store.record_timing(&task, "llm", 250.0);
    store.record_timing(&task, "llm", f64::NAN);
    store.record_timing(&task, "llm", f64::INFINITY);
    store.record_session(
        &task,
        SessionEvent::Ended {
            duration_ms: f64::NAN,
        },
    );

    repository.save(&store.snapshot()).await.unwrap();
    let loaded = repository.load().await.unwrap();
    assert_eq!(loaded.scopes.len(), 1);

    let restored = ScopeStore::restore(&repository).await;
    assert_eq!(restored.len(), 1);
    let timing = restored.get(&task).unwrap().timing("llm");
    assert_eq!(timing.count, 1);
    assert!((timing.avg_ms - 250.0).abs() < 1e-9);
}
