//! # Event Loop Bridge Module
//!
//! This module bridges the synchronous HTTP front door and the single
//! background worker that owns all session state. The worker is one dedicated
//! OS thread running a current-thread tokio runtime with a `LocalSet`, so
//! submitted units execute serially-interleaved (cooperative concurrency) and
//! never in parallel with each other. That single-writer discipline is what
//! lets the session store live in a plain `RefCell` without locks.
//!
//! Callers submit a unit of work and get back a [`TaskHandle`] they can poll,
//! block on, await, cancel, or attach a completion callback to.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::BotError;

/// Future produced by a unit once it is on the worker thread.
///
/// Deliberately not `Send`: units may freely touch worker-local state.
pub type UnitFuture = Pin<Box<dyn Future<Output = Result<()>> + 'static>>;

/// A unit of work: a `Send` closure that, handed the worker-local context,
/// produces the (non-`Send`) future to run.
pub type Unit<C> = Box<dyn FnOnce(Rc<C>) -> UnitFuture + Send + 'static>;

/// Wrap an async closure as a submittable [`Unit`].
pub fn unit<C, F, Fut>(f: F) -> Unit<C>
where
    F: FnOnce(Rc<C>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    Box::new(move |ctx| Box::pin(f(ctx)))
}

/// Terminal outcome of a submitted unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The unit ran to completion successfully
    Done,
    /// The unit returned an error (message preserved for logging)
    Failed(String),
    /// The handle was cancelled before the unit completed
    Cancelled,
}

type CompletionCallback = Box<dyn FnOnce(&TaskOutcome) + Send + 'static>;

struct TaskState {
    outcome: Option<TaskOutcome>,
    callbacks: Vec<CompletionCallback>,
}

struct TaskShared {
    correlation: String,
    created_at: Instant,
    cancelled: AtomicBool,
    state: Mutex<TaskState>,
    cond: Condvar,
}

impl TaskShared {
    /// Record the terminal outcome exactly once, wake blocking waiters and
    /// fire registered callbacks. Later calls are ignored, so a unit that
    /// finishes after its handle was cancelled cannot overwrite the
    /// cancellation the waiters already observed.
    fn complete(&self, outcome: TaskOutcome) {
        let (callbacks, outcome) = {
            let mut state = self.state.lock().unwrap();
            if state.outcome.is_some() {
                return;
            }
            let outcome = if self.cancelled.load(Ordering::SeqCst) {
                TaskOutcome::Cancelled
            } else {
                outcome
            };
            state.outcome = Some(outcome.clone());
            (std::mem::take(&mut state.callbacks), outcome)
        };
        self.cond.notify_all();
        for callback in callbacks {
            callback(&outcome);
        }
    }
}

/// Handle to a submitted unit of work
///
/// Cheap to clone; all clones observe the same outcome. Blocking waits are
/// meant for the HTTP threads, async waits for the worker-side callers.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    fn new(correlation: String) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                correlation,
                created_at: Instant::now(),
                cancelled: AtomicBool::new(false),
                state: Mutex::new(TaskState {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Opaque correlation id (the inbound event id) carried for logging
    pub fn correlation(&self) -> &str {
        &self.shared.correlation
    }

    /// Time elapsed since the unit was submitted
    pub fn elapsed(&self) -> Duration {
        self.shared.created_at.elapsed()
    }

    pub fn is_done(&self) -> bool {
        self.shared.state.lock().unwrap().outcome.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// The outcome, if the unit has reached one
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.shared.state.lock().unwrap().outcome.clone()
    }

    /// Mark the handle cancelled. A unit that has not started yet will be
    /// skipped by the worker; a finished unit keeps its outcome and only the
    /// cancelled flag flips. The worker never interrupts a running unit.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.complete(TaskOutcome::Cancelled);
    }

    /// Register a callback invoked exactly once with the terminal outcome.
    /// If the unit already completed, the callback runs immediately on the
    /// calling thread; otherwise it runs on the worker at completion time.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            callback(&outcome);
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }

    /// Block the calling thread until the unit completes or the timeout
    /// elapses. Returns `None` on timeout; the unit keeps running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    /// Await the terminal outcome without blocking the executor.
    pub async fn wait(&self) -> TaskOutcome {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx.await.unwrap_or(TaskOutcome::Cancelled)
    }

    /// Await the outcome for at most `budget`. `None` means the unit is still
    /// in flight; it is not cancelled.
    pub async fn wait_for(&self, budget: Duration) -> Option<TaskOutcome> {
        tokio::time::timeout(budget, self.wait()).await.ok()
    }
}

struct Envelope<C> {
    unit: Unit<C>,
    handle: TaskHandle,
}

/// Owner of the single background worker thread.
///
/// `start()` is idempotent and blocks until the worker signals readiness;
/// `submit()` enqueues a unit and returns immediately with its handle.
pub struct EventLoopBridge<C: 'static> {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope<C>>>>,
}

impl<C: 'static> Default for EventLoopBridge<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> EventLoopBridge<C> {
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
        }
    }

    pub fn is_started(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /// Spin up the worker thread, build the worker-local context with
    /// `factory` on that thread, and block until the worker is ready to
    /// accept units. Calling `start` again is a no-op.
    pub fn start<F>(&self, factory: F) -> Result<()>
    where
        F: FnOnce() -> Result<C> + Send + 'static,
    {
        let mut sender = self.sender.lock().unwrap();
        if sender.is_some() {
            debug!("worker already started, ignoring start()");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Envelope<C>>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("brain-dump-worker".into())
            .spawn(move || worker_main(factory, rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *sender = Some(tx);
                info!("background worker ready");
                Ok(())
            }
            Ok(Err(msg)) => Err(BotError::Initialization(msg).into()),
            Err(_) => Err(BotError::Initialization("worker thread exited before signalling readiness".into()).into()),
        }
    }

    /// Enqueue a unit onto the worker. Fails with a scheduling error if the
    /// worker was never started or has shut down.
    pub fn submit(&self, correlation: impl Into<String>, unit: Unit<C>) -> Result<TaskHandle, BotError> {
        let sender = self.sender.lock().unwrap();
        let Some(tx) = sender.as_ref() else {
            return Err(BotError::Scheduling("worker not started".into()));
        };
        let handle = TaskHandle::new(correlation.into());
        tx.send(Envelope {
            unit,
            handle: handle.clone(),
        })
        .map_err(|_| BotError::Scheduling("worker has shut down".into()))?;
        Ok(handle)
    }
}

fn worker_main<C, F>(
    factory: F,
    mut rx: mpsc::UnboundedReceiver<Envelope<C>>,
    ready_tx: std::sync::mpsc::Sender<Result<(), String>>,
) where
    C: 'static,
    F: FnOnce() -> Result<C>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to build worker runtime: {e}")));
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let ctx = match factory() {
            Ok(ctx) => Rc::new(ctx),
            Err(e) => {
                let _ = ready_tx.send(Err(format!("failed to build worker context: {e:#}")));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        while let Some(envelope) = rx.recv().await {
            let ctx = Rc::clone(&ctx);
            tokio::task::spawn_local(run_unit(ctx, envelope));
        }
        debug!("all bridge senders dropped, worker shutting down");
    });
}

async fn run_unit<C>(ctx: Rc<C>, envelope: Envelope<C>) {
    let Envelope { unit, handle } = envelope;
    if handle.is_cancelled() {
        debug!(correlation = %handle.correlation(), "skipping cancelled unit");
        handle.shared.complete(TaskOutcome::Cancelled);
        return;
    }
    match unit(ctx).await {
        Ok(()) => handle.shared.complete(TaskOutcome::Done),
        Err(e) => {
            error!(
                correlation = %handle.correlation(),
                error = %format!("{e:#}"),
                "unit failed on worker"
            );
            handle.shared.complete(TaskOutcome::Failed(format!("{e:#}")));
        }
    }
}
