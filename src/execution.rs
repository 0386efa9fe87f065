//! Per-invocation execution state.
//!
//! One [`Execution`] is created per top-level executor call and lives until
//! the outermost policy returns. Policies and the user function share it
//! through cheap clones; the public surface is read-only, while mutation
//! (attempt counters, result recording, cancellation records) stays inside
//! the crate.

use crate::events::{AttemptEvent, CompletedEvent, ScheduledEvent};
use crate::outcome::PolicyOutcome;
use crate::FaultError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Cancellation index used for the user-supplied signal: it out-ranks every
/// policy layer.
pub(crate) const SIGNAL_CANCEL_INDEX: usize = usize::MAX;

/// User-facing cancellation trigger.
///
/// Create one, hand its [`CancelSignal`] to an executor via `with_signal`,
/// and call [`Cancellation::cancel`] to cooperatively stop the execution:
/// pending retry delays wake immediately, no further attempts start, and an
/// in-flight user function can poll [`Execution::is_canceled`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        // send_replace stores the value even when no subscriber exists yet.
        self.tx.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe a signal that executors can watch.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal { rx: self.tx.subscribe() }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber half of a [`Cancellation`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    pub(crate) rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }
}

struct LastOutcome<R, E> {
    value: Option<R>,
    error: Option<FaultError<E>>,
}

struct CancelRecord<R, E> {
    index: usize,
    outcome: PolicyOutcome<R, E>,
}

struct ExecutionInner<R, E> {
    attempts: AtomicUsize,
    executions: AtomicUsize,
    started: Instant,
    attempt_started: Mutex<Instant>,
    last: Mutex<LastOutcome<R, E>>,
    cancel: Mutex<Option<CancelRecord<R, E>>>,
    cancel_tx: watch::Sender<bool>,
}

/// Handle onto the state of one top-level execution.
///
/// Clones share state. The handle passed to execution-aware operations lets
/// the user function observe attempt counters, elapsed times, the previous
/// outcome, and cancellation.
pub struct Execution<R, E> {
    inner: Arc<ExecutionInner<R, E>>,
}

impl<R, E> Clone for Execution<R, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<R, E> std::fmt::Debug for Execution<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("attempts", &self.attempts())
            .field("executions", &self.executions())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl<R, E> Execution<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (cancel_tx, _rx) = watch::channel(false);
        let now = Instant::now();
        Self {
            inner: Arc::new(ExecutionInner {
                attempts: AtomicUsize::new(0),
                executions: AtomicUsize::new(0),
                started: now,
                attempt_started: Mutex::new(now),
                last: Mutex::new(LastOutcome { value: None, error: None }),
                cancel: Mutex::new(None),
                cancel_tx,
            }),
        }
    }

    /// Attempts so far, counting the current one. 1-based once the first
    /// attempt has been initialized.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Times the user function actually ran.
    pub fn executions(&self) -> usize {
        self.inner.executions.load(Ordering::Acquire)
    }

    /// Time since the execution started.
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Time since the current attempt started.
    pub fn elapsed_attempt(&self) -> Duration {
        self.inner.attempt_started.lock().unwrap().elapsed()
    }

    /// Value produced by the previous attempt, if any.
    pub fn last_value(&self) -> Option<R> {
        self.inner.last.lock().unwrap().value.clone()
    }

    /// Error produced by the previous attempt, if any.
    pub fn last_error(&self) -> Option<FaultError<E>> {
        self.inner.last.lock().unwrap().error.clone()
    }

    pub fn is_first_attempt(&self) -> bool {
        self.attempts() <= 1
    }

    pub fn is_retry(&self) -> bool {
        self.attempts() > 1
    }

    /// Whether a cancellation has been recorded, by the user signal or by a
    /// policy layer.
    pub fn is_canceled(&self) -> bool {
        self.inner.cancel.lock().unwrap().is_some()
    }

    /// Wait until the execution is canceled. Returns immediately if it
    /// already was. Intended for user functions that want to abandon work
    /// cooperatively.
    pub async fn canceled(&self) {
        let mut rx = self.inner.cancel_tx.subscribe();
        let _ = rx.wait_for(|canceled| *canceled).await;
    }

    /// Start the next attempt: bumps the attempt counter and restarts the
    /// attempt timer.
    pub(crate) fn initialize_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::AcqRel);
        *self.inner.attempt_started.lock().unwrap() = Instant::now();
    }

    /// Record the outcome of one run of the user function. If a cancellation
    /// has been recorded in the meantime, the cancellation outcome replaces
    /// the produced one.
    pub(crate) fn record(&self, outcome: PolicyOutcome<R, E>) -> PolicyOutcome<R, E> {
        self.inner.executions.fetch_add(1, Ordering::AcqRel);
        if let Some(record) = self.inner.cancel.lock().unwrap().as_ref() {
            return record.outcome.clone();
        }
        let mut last = self.inner.last.lock().unwrap();
        last.value = outcome.value.clone();
        last.error = outcome.error.clone();
        outcome
    }

    /// Record a cancellation at `index` with the terminal `outcome`. The
    /// first record wins (the innermost source for simultaneous requests,
    /// since inner layers observe outcomes first); later calls are ignored.
    pub(crate) fn cancel(&self, index: usize, outcome: PolicyOutcome<R, E>) {
        {
            let mut cancel = self.inner.cancel.lock().unwrap();
            if cancel.is_some() {
                return;
            }
            *cancel = Some(CancelRecord { index, outcome });
        }
        self.inner.cancel_tx.send_replace(true);
    }

    /// The terminal outcome recorded by the winning cancellation, if any.
    pub(crate) fn canceled_outcome(&self) -> Option<PolicyOutcome<R, E>> {
        self.inner.cancel.lock().unwrap().as_ref().map(|record| record.outcome.clone())
    }

    /// Layer index that recorded the cancellation, if any.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn canceled_index(&self) -> Option<usize> {
        self.inner.cancel.lock().unwrap().as_ref().map(|record| record.index)
    }

    /// Receiver that flips to true when a cancellation is recorded; used to
    /// wake pending retry delays.
    pub(crate) fn cancel_watch(&self) -> watch::Receiver<bool> {
        self.inner.cancel_tx.subscribe()
    }

    pub(crate) fn attempt_event(&self) -> AttemptEvent<R, E> {
        let last = self.inner.last.lock().unwrap();
        AttemptEvent {
            last_value: last.value.clone(),
            last_error: last.error.clone(),
            attempts: self.attempts(),
            executions: self.executions(),
            elapsed: self.elapsed(),
            elapsed_attempt: self.elapsed_attempt(),
            is_first_attempt: self.is_first_attempt(),
            is_retry: self.is_retry(),
        }
    }

    pub(crate) fn scheduled_event(&self, delay: Duration) -> ScheduledEvent<R, E> {
        ScheduledEvent { attempt: self.attempt_event(), delay }
    }

    pub(crate) fn completed_event(&self, outcome: &PolicyOutcome<R, E>) -> CompletedEvent<R, E> {
        CompletedEvent {
            value: outcome.value.clone(),
            error: outcome.error.clone(),
            attempts: self.attempts(),
            executions: self.executions(),
            elapsed: self.elapsed(),
            is_first_attempt: self.is_first_attempt(),
            is_retry: self.is_retry(),
        }
    }
}
