//! Alert delivery, de-duplication and PRD isolation through the engine.

mod common;

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use common::RecordingListener;
use overwatch::domain::models::{
    AlertEvent, AlertSeverity, CodeGenSample, IssueKind, PhaseProgressSample, ScopeKind, ScopeRef,
    StreamKind,
};
use overwatch::domain::ports::AlertListener;

struct ExplodingListener;

impl AlertListener for ExplodingListener {
    fn on_alert(&self, _event: &AlertEvent) -> anyhow::Result<()> {
        panic!("listener bug")
    }
}

fn degrade(engine: &overwatch::MetricsEngine, prd: &ScopeRef) {
    for i in 0..25 {
        engine.record_code_generation(
            prd,
            CodeGenSample {
                success: i < 13,
                test_passed: false,
            },
        );
    }
}

#[tokio::test]
async fn test_listeners_receive_alerts_despite_panicking_peer() {
    let engine = common::engine();
    let recording = Arc::new(RecordingListener::default());
    let _exploding = engine.bus().add_listener(Arc::new(ExplodingListener));
    let _recording = engine.bus().add_listener(recording.clone());

    let prd = ScopeRef::prd("p1");
    degrade(&engine, &prd);
    engine.declare_dependency(&prd, "a", "b");
    engine.declare_dependency(&prd, "b", "a");

    assert!(common::wait_for(|| recording.events.lock().len() == 2, 2_000).await);
    let events = recording.events.lock().clone();
    assert_eq!(events[0].event_type, "code_generation_degradation");
    assert_eq!(events[1].event_type, "dependency_deadlock");
    assert_eq!(events[1].severity, AlertSeverity::Critical);
    assert!(events
        .iter()
        .all(|event| event.scope_id == "prd:p1"));
}

#[test]
fn test_reset_rearms_alerts() {
    let engine = common::engine();
    let mut rx = engine.bus().subscribe();
    let prd = ScopeRef::prd("p1");

    degrade(&engine, &prd);
    assert_eq!(rx.try_recv().unwrap().event_type, "code_generation_degradation");

    // Still degraded and still armed: no repeat
    engine.check_all(&prd, Utc::now());
    assert!(rx.try_recv().is_err());

    engine.reset(&prd);
    degrade(&engine, &prd);
    assert_eq!(rx.try_recv().unwrap().event_type, "code_generation_degradation");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_stall_detected_on_explicit_check() {
    let engine = common::engine();
    let mut rx = engine.bus().subscribe();
    let prd = ScopeRef::prd("p1");

    engine.mark_blocked(&prd, "t1", "waiting on schema review");
    engine.check_deadlock(&prd, Utc::now() + Duration::minutes(10));
    assert!(rx.try_recv().is_err());

    engine.check_deadlock(&prd, Utc::now() + Duration::minutes(45));
    let alert = rx.try_recv().unwrap();
    assert_eq!(alert.event_type, "dependency_deadlock");
    assert_eq!(alert.payload["stats"]["stalled_tasks"][0], "t1");
    assert!(alert.payload["value"].as_f64().unwrap() > 30.0);

    let board = engine.issue_board(&prd).unwrap();
    assert_eq!(board.detected(), vec![IssueKind::DependencyDeadlock]);
}

#[test]
fn test_phase_progress_reported_with_deadlock_state() {
    let engine = common::engine();
    let prd = ScopeRef::prd("p1");

    for completed in [0, 2, 4] {
        engine.record_phase_progress(
            &prd,
            PhaseProgressSample {
                phase_id: "build".to_string(),
                completed_tasks: completed,
                total_tasks: 10,
            },
        );
    }

    assert_eq!(engine.stream_len(&prd, StreamKind::PhaseProgress), 3);
    let board = engine.issue_board(&prd).unwrap();
    assert!(!board.deadlock.detected);
    assert!(board.deadlock.stats.progress_rate >= 0.0);
}

#[test]
fn test_blocked_counts_roll_up_to_prd() {
    let engine = common::engine();
    let store = engine.store().clone();
    let tasks = common::build_hierarchy(&store, 1, 2);
    let prd = ScopeRef::prd("prd");

    engine.mark_blocked(&prd, &tasks[0].id, "needs review");
    engine.mark_blocked(&prd, &tasks[1].id, "needs review");
    assert_eq!(store.get(&prd).unwrap().counters.blocked(), 2);
    assert_eq!(
        store
            .get_scope(ScopeKind::Phase, "phase-0")
            .unwrap()
            .counters
            .blocked(),
        2
    );

    engine.mark_unblocked(&prd, &tasks[0].id);
    // Unblocking a task that is not blocked is a no-op
    engine.mark_unblocked(&prd, &tasks[0].id);
    assert_eq!(store.get(&prd).unwrap().counters.blocked(), 1);
}

#[test]
fn test_parallel_prds_do_not_share_state() {
    let engine = Arc::new(common::engine());
    let mut rx = engine.bus().subscribe();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let engine = engine.clone();
            thread::spawn(move || {
                let prd = ScopeRef::prd(format!("p{n}"));
                for i in 0..40 {
                    // Only even PRDs degrade
                    let success = n % 2 == 1 || i < 20;
                    engine.record_code_generation(
                        &prd,
                        CodeGenSample {
                            success,
                            test_passed: success,
                        },
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut alerted: Vec<String> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        alerted.push(event.scope_id);
    }
    alerted.sort();
    assert_eq!(alerted, vec!["prd:p0".to_string(), "prd:p2".to_string()]);
    assert_eq!(engine.monitored_prds().len(), 4);

    let quiet = engine.issue_board(&ScopeRef::prd("p1")).unwrap();
    assert!(quiet.detected().is_empty());
    assert_eq!(quiet.code_generation.sample_count, 40);
}
