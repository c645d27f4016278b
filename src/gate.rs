//! # Initialization Gate Module
//!
//! Single-flight, idempotent bootstrap for the one-time bot setup (storage
//! schema, Telegram webhook registration, review scheduler). Any number of
//! concurrent callers funnel through `ensure()`: at most one setup attempt is
//! in flight, everyone awaits the same published handle and observes the same
//! outcome, and a failed attempt is retried lazily by the next caller rather
//! than by a background loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::bridge::{EventLoopBridge, TaskHandle, TaskOutcome, Unit};

/// Outcome of `ensure()` as seen by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Ready,
    Failed(String),
}

/// Lifecycle of the one-time setup attempt.
///
/// Exactly one `InProgress` may exist at a time; `Ready` is terminal for the
/// process lifetime; `Failed` permits the next caller to start a new attempt.
enum GateState {
    NotStarted,
    InProgress(TaskHandle),
    Ready,
    Failed(String),
}

struct GateInner {
    ready: AtomicBool,
    state: Mutex<GateState>,
}

/// Gate guarding the one-time bot setup routine
pub struct InitializationGate<C: 'static> {
    inner: Arc<GateInner>,
    bridge: Arc<EventLoopBridge<C>>,
    setup: Box<dyn Fn() -> Unit<C> + Send + Sync>,
}

impl<C: 'static> InitializationGate<C> {
    /// `setup` builds a fresh setup unit for each attempt; it runs on the
    /// worker like any other unit.
    pub fn new<S>(bridge: Arc<EventLoopBridge<C>>, setup: S) -> Self
    where
        S: Fn() -> Unit<C> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(GateInner {
                ready: AtomicBool::new(false),
                state: Mutex::new(GateState::NotStarted),
            }),
            bridge,
            setup: Box::new(setup),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Join (or start) the current setup attempt and return its in-flight
    /// handle, or `None` when setup already finished successfully.
    ///
    /// The mutex guards only the check-and-set; callers wait on the handle
    /// outside the lock, so the critical section never blocks on I/O.
    fn join_attempt(&self) -> Result<Option<TaskHandle>, String> {
        let mut state = self.inner.state.lock().unwrap();
        match &*state {
            GateState::Ready => return Ok(None),
            GateState::InProgress(handle) => return Ok(Some(handle.clone())),
            GateState::Failed(prev) => {
                info!(previous_error = %prev, "retrying bot initialization");
            }
            GateState::NotStarted => {
                info!("starting bot initialization attempt");
            }
        }

        let handle = self
            .bridge
            .submit("init", (self.setup)())
            .map_err(|e| e.to_string())?;
        *state = GateState::InProgress(handle.clone());
        // Release the state lock before registering the done-callback: a unit
        // that already finished runs the callback inline on this thread, and
        // the callback takes the same lock.
        drop(state);

        // The done-callback replaces the in-flight slot: success pins the
        // permanent ready flag, failure re-arms the gate for the next caller.
        let inner = Arc::clone(&self.inner);
        handle.on_complete(move |outcome| {
            let mut state = inner.state.lock().unwrap();
            match outcome {
                TaskOutcome::Done => {
                    inner.ready.store(true, Ordering::Release);
                    *state = GateState::Ready;
                    info!("bot initialization complete");
                }
                TaskOutcome::Failed(msg) => {
                    warn!(error = %msg, "bot initialization failed, will retry on next request");
                    *state = GateState::Failed(msg.clone());
                }
                TaskOutcome::Cancelled => {
                    warn!("bot initialization cancelled, will retry on next request");
                    *state = GateState::Failed("initialization cancelled".into());
                }
            }
        });
        Ok(Some(handle))
    }

    /// Ensure setup has run, starting an attempt if none is in flight.
    /// All concurrent callers observe the outcome of the same attempt.
    pub async fn ensure(&self) -> GateStatus {
        if self.is_ready() {
            return GateStatus::Ready;
        }
        let handle = match self.join_attempt() {
            Ok(Some(handle)) => handle,
            Ok(None) => return GateStatus::Ready,
            Err(msg) => return GateStatus::Failed(msg),
        };
        match handle.wait().await {
            TaskOutcome::Done => GateStatus::Ready,
            TaskOutcome::Failed(msg) => GateStatus::Failed(msg),
            TaskOutcome::Cancelled => GateStatus::Failed("initialization cancelled".into()),
        }
    }

    /// Synchronous counterpart of `ensure()` for callers outside the async
    /// runtime (e.g. a preflight check in `main`). Shares the same underlying
    /// handle as async callers. A timeout does not abort the attempt.
    pub fn ensure_blocking(&self, timeout: Duration) -> GateStatus {
        if self.is_ready() {
            return GateStatus::Ready;
        }
        let handle = match self.join_attempt() {
            Ok(Some(handle)) => handle,
            Ok(None) => return GateStatus::Ready,
            Err(msg) => return GateStatus::Failed(msg),
        };
        match handle.wait_timeout(timeout) {
            Some(TaskOutcome::Done) => GateStatus::Ready,
            Some(TaskOutcome::Failed(msg)) => GateStatus::Failed(msg),
            Some(TaskOutcome::Cancelled) => GateStatus::Failed("initialization cancelled".into()),
            None => GateStatus::Failed("initialization still in progress".into()),
        }
    }
}
