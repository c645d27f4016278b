//! Tests for the initialization gate: single-flight setup, shared outcomes
//! across concurrent callers, and lazy retry after failure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brain_dump_bot::bridge::{unit, EventLoopBridge};
use brain_dump_bot::gate::{GateStatus, InitializationGate};

struct GateCtx {
    setup_runs: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
}

fn gate_fixture(fail_first: bool) -> (Arc<InitializationGate<GateCtx>>, Arc<AtomicUsize>) {
    let setup_runs = Arc::new(AtomicUsize::new(0));
    let fail_next = Arc::new(AtomicBool::new(fail_first));
    let bridge = Arc::new(EventLoopBridge::new());
    {
        let setup_runs = Arc::clone(&setup_runs);
        let fail_next = Arc::clone(&fail_next);
        bridge
            .start(move || {
                Ok(GateCtx {
                    setup_runs,
                    fail_next,
                })
            })
            .expect("worker should start");
    }
    let gate = Arc::new(InitializationGate::new(bridge, || {
        unit(|ctx: std::rc::Rc<GateCtx>| async move {
            // Yield so concurrent ensure() callers pile up on one attempt
            tokio::time::sleep(Duration::from_millis(30)).await;
            ctx.setup_runs.fetch_add(1, Ordering::SeqCst);
            if ctx.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("setup exploded");
            }
            Ok(())
        })
    }));
    (gate, setup_runs)
}

#[tokio::test]
async fn concurrent_callers_share_one_setup_attempt() {
    let (gate, setup_runs) = gate_fixture(false);
    let mut joins = Vec::new();
    for _ in 0..8 {
        let gate = Arc::clone(&gate);
        joins.push(tokio::spawn(async move { gate.ensure().await }));
    }
    for join in joins {
        assert_eq!(join.await.unwrap(), GateStatus::Ready);
    }
    assert_eq!(setup_runs.load(Ordering::SeqCst), 1);
    assert!(gate.is_ready());
}

#[tokio::test]
async fn failed_setup_is_retried_by_the_next_caller() {
    let (gate, setup_runs) = gate_fixture(true);
    match gate.ensure().await {
        GateStatus::Failed(msg) => assert!(msg.contains("setup exploded")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(!gate.is_ready());
    assert_eq!(setup_runs.load(Ordering::SeqCst), 1);

    // Next caller starts a fresh attempt, which now succeeds
    assert_eq!(gate.ensure().await, GateStatus::Ready);
    assert_eq!(setup_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ready_gate_short_circuits_without_new_attempts() {
    let (gate, setup_runs) = gate_fixture(false);
    assert_eq!(gate.ensure().await, GateStatus::Ready);
    for _ in 0..5 {
        assert_eq!(gate.ensure().await, GateStatus::Ready);
    }
    assert_eq!(setup_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocking_ensure_shares_the_same_attempt() {
    let (gate, setup_runs) = gate_fixture(false);
    let blocking_gate = Arc::clone(&gate);
    let blocking = tokio::task::spawn_blocking(move || {
        blocking_gate.ensure_blocking(Duration::from_secs(2))
    });
    let async_status = gate.ensure().await;
    assert_eq!(async_status, GateStatus::Ready);
    assert_eq!(blocking.await.unwrap(), GateStatus::Ready);
    assert_eq!(setup_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rapid_retries_against_instant_failures_never_stall() {
    // A setup unit that fails the moment it runs makes the completion
    // callback fire while the caller is still inside join_attempt, so this
    // hammers the window between submit and callback registration.
    let bridge = Arc::new(EventLoopBridge::new());
    bridge
        .start(|| {
            Ok(GateCtx {
                setup_runs: Arc::new(AtomicUsize::new(0)),
                fail_next: Arc::new(AtomicBool::new(false)),
            })
        })
        .expect("worker should start");
    let gate = Arc::new(InitializationGate::new(bridge, || {
        unit(|_ctx: std::rc::Rc<GateCtx>| async { anyhow::bail!("setup exploded") })
    }));

    let retries = tokio::task::spawn_blocking(move || {
        for _ in 0..500 {
            match gate.ensure_blocking(Duration::from_secs(2)) {
                GateStatus::Failed(_) => {}
                other => panic!("expected Failed, got {other:?}"),
            }
        }
    });
    retries.await.expect("retry loop must run to completion");
}

#[tokio::test]
async fn gate_over_unstarted_worker_reports_failure() {
    let bridge: Arc<EventLoopBridge<GateCtx>> = Arc::new(EventLoopBridge::new());
    let gate = InitializationGate::new(bridge, || {
        unit(|_ctx: std::rc::Rc<GateCtx>| async { Ok(()) })
    });
    match gate.ensure().await {
        GateStatus::Failed(msg) => assert!(msg.contains("worker not started")),
        other => panic!("expected Failed, got {other:?}"),
    }
}
