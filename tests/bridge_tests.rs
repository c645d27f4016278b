//! Tests for the event loop bridge: serial execution on the worker,
//! handle outcomes, cancellation and timeouts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brain_dump_bot::bridge::{unit, EventLoopBridge, TaskOutcome};

/// Worker-local context for tests; side effects escape through shared Arcs.
struct TestCtx {
    hits: Arc<AtomicUsize>,
    order: Arc<Mutex<Vec<usize>>>,
}

fn started_bridge() -> (Arc<EventLoopBridge<TestCtx>>, Arc<AtomicUsize>, Arc<Mutex<Vec<usize>>>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));
    let bridge = Arc::new(EventLoopBridge::new());
    {
        let hits = Arc::clone(&hits);
        let order = Arc::clone(&order);
        bridge
            .start(move || Ok(TestCtx { hits, order }))
            .expect("worker should start");
    }
    (bridge, hits, order)
}

#[tokio::test]
async fn submitted_unit_runs_to_completion() {
    let (bridge, hits, _) = started_bridge();
    let handle = bridge
        .submit(
            "u1",
            unit(|ctx: std::rc::Rc<TestCtx>| async move {
                ctx.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    assert_eq!(handle.wait().await, TaskOutcome::Done);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(handle.is_done());
}

#[tokio::test]
async fn submit_before_start_is_a_scheduling_error() {
    let bridge: EventLoopBridge<TestCtx> = EventLoopBridge::new();
    let result = bridge.submit("u1", unit(|_ctx| async { Ok(()) }));
    let err = result.err().expect("submit must fail before start");
    assert!(err.to_string().contains("worker not started"));
}

#[tokio::test]
async fn units_complete_in_submission_order() {
    let (bridge, _, order) = started_bridge();
    let mut last = None;
    for i in 0..10usize {
        let handle = bridge
            .submit(
                format!("u{i}"),
                unit(move |ctx: std::rc::Rc<TestCtx>| async move {
                    ctx.order.lock().unwrap().push(i);
                    Ok(())
                }),
            )
            .unwrap();
        last = Some(handle);
    }
    assert_eq!(last.unwrap().wait().await, TaskOutcome::Done);
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn failing_unit_reports_failed_outcome() {
    let (bridge, hits, _) = started_bridge();
    let handle = bridge
        .submit(
            "boom",
            unit(|_ctx: std::rc::Rc<TestCtx>| async move {
                anyhow::bail!("deliberate failure")
            }),
        )
        .unwrap();
    match handle.wait().await {
        TaskOutcome::Failed(msg) => assert!(msg.contains("deliberate failure")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_unit_is_skipped_by_the_worker() {
    let (bridge, hits, _) = started_bridge();
    // Head-of-line unit keeps the worker busy long enough to cancel the next
    let blocker = bridge
        .submit(
            "blocker",
            unit(|_ctx: std::rc::Rc<TestCtx>| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }),
        )
        .unwrap();
    let victim = bridge
        .submit(
            "victim",
            unit(|ctx: std::rc::Rc<TestCtx>| async move {
                ctx.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    victim.cancel();
    assert_eq!(victim.wait().await, TaskOutcome::Cancelled);
    assert!(victim.is_cancelled());
    assert_eq!(blocker.wait().await, TaskOutcome::Done);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wait_for_times_out_then_unit_still_finishes() {
    let (bridge, hits, _) = started_bridge();
    let handle = bridge
        .submit(
            "slow",
            unit(|ctx: std::rc::Rc<TestCtx>| async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                ctx.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    // Budget elapses first: the unit is not cancelled, just not done yet
    assert_eq!(handle.wait_for(Duration::from_millis(20)).await, None);
    assert!(!handle.is_cancelled());
    assert_eq!(handle.wait().await, TaskOutcome::Done);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocking_wait_observes_outcome_from_another_thread() {
    let (bridge, _, _) = started_bridge();
    let handle = bridge
        .submit("w", unit(|_ctx: std::rc::Rc<TestCtx>| async { Ok(()) }))
        .unwrap();
    let outcome = tokio::task::spawn_blocking(move || handle.wait_timeout(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(outcome, Some(TaskOutcome::Done));
}

#[tokio::test]
async fn start_is_idempotent_and_factory_runs_once() {
    let factory_runs = Arc::new(AtomicUsize::new(0));
    let bridge: EventLoopBridge<TestCtx> = EventLoopBridge::new();
    for _ in 0..3 {
        let runs = Arc::clone(&factory_runs);
        bridge
            .start(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(TestCtx {
                    hits: Arc::new(AtomicUsize::new(0)),
                    order: Arc::new(Mutex::new(Vec::new())),
                })
            })
            .unwrap();
    }
    assert!(bridge.is_started());
    assert_eq!(factory_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn completion_callback_fires_exactly_once() {
    let (bridge, _, _) = started_bridge();
    let handle = bridge
        .submit("cb", unit(|_ctx: std::rc::Rc<TestCtx>| async { Ok(()) }))
        .unwrap();
    assert_eq!(handle.wait().await, TaskOutcome::Done);

    // Registered after completion: runs immediately on this thread
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    handle.on_complete(move |outcome| {
        assert_eq!(*outcome, TaskOutcome::Done);
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
