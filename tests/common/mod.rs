//! Shared helpers for the integration suites: stub errors, flaky operation
//! factories, and a counter set covering every listener the library emits.

#![allow(dead_code)]

use backstop::{
    CircuitBreakerBuilder, Executor, FallbackBuilder, FaultError, RetryPolicyBuilder,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Stub operation error with distinguishable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubError {
    State,
    Argument,
    Connection,
}

impl std::fmt::Display for StubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StubError::State => write!(f, "invalid state"),
            StubError::Argument => write!(f, "invalid argument"),
            StubError::Connection => write!(f, "connection refused"),
        }
    }
}

impl std::error::Error for StubError {}

type StubFuture<R> = Pin<Box<dyn Future<Output = Result<R, FaultError<StubError>>> + Send>>;

/// Operation failing with `error` for the first `failures` calls, then
/// returning the configured results in order (the last one repeats).
pub fn error_n_times_then_return<R>(
    error: StubError,
    failures: usize,
    results: Vec<R>,
) -> impl Fn() -> StubFuture<R> + Send + Sync + 'static
where
    R: Clone + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    move || {
        let calls = calls.clone();
        let results = results.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures || results.is_empty() {
                Err(FaultError::Inner(error))
            } else {
                let index = (n - failures).min(results.len() - 1);
                Ok(results[index].clone())
            }
        })
    }
}

/// Operation failing with `first` for `failures` calls, then failing with
/// `then` forever.
pub fn error_n_times_then_error<R>(
    first: StubError,
    failures: usize,
    then: StubError,
) -> impl Fn() -> StubFuture<R> + Send + Sync + 'static
where
    R: Clone + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    move || {
        let calls = calls.clone();
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(FaultError::Inner(first))
            } else {
                Err(FaultError::Inner(then))
            }
        })
    }
}

/// One counter per listener the library can emit.
#[derive(Debug, Default)]
pub struct ListenerStats {
    // Retry
    pub abort: AtomicUsize,
    pub rp_failed_attempt: AtomicUsize,
    pub retries_exceeded: AtomicUsize,
    pub retry: AtomicUsize,
    pub retry_scheduled: AtomicUsize,
    pub rp_success: AtomicUsize,
    pub rp_failure: AtomicUsize,

    // Circuit breaker
    pub open: AtomicUsize,
    pub close: AtomicUsize,
    pub half_open: AtomicUsize,
    pub cb_success: AtomicUsize,
    pub cb_failure: AtomicUsize,

    // Fallback
    pub fb_failed_attempt: AtomicUsize,
    pub fb_success: AtomicUsize,
    pub fb_failure: AtomicUsize,

    // Executor
    pub complete: AtomicUsize,
    pub success: AtomicUsize,
    pub failure: AtomicUsize,
}

impl ListenerStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn bump(counter: &Arc<ListenerStats>, pick: fn(&ListenerStats) -> &AtomicUsize) -> impl Fn() {
    let stats = counter.clone();
    move || {
        pick(&stats).fetch_add(1, Ordering::SeqCst);
    }
}

/// Register counting listeners on a retry builder.
pub fn count_retry_listeners<R>(
    stats: &Arc<ListenerStats>,
    builder: RetryPolicyBuilder<R, StubError>,
) -> RetryPolicyBuilder<R, StubError>
where
    R: Clone + Send + Sync + 'static,
{
    let on_abort = bump(stats, |s| &s.abort);
    let on_failed = bump(stats, |s| &s.rp_failed_attempt);
    let on_exceeded = bump(stats, |s| &s.retries_exceeded);
    let on_retry = bump(stats, |s| &s.retry);
    let on_scheduled = bump(stats, |s| &s.retry_scheduled);
    let on_success = bump(stats, |s| &s.rp_success);
    let on_failure = bump(stats, |s| &s.rp_failure);
    builder
        .on_abort(move |_| on_abort())
        .on_failed_attempt(move |_| on_failed())
        .on_retries_exceeded(move |_| on_exceeded())
        .on_retry(move |_| on_retry())
        .on_retry_scheduled(move |_| on_scheduled())
        .on_success(move |_| on_success())
        .on_failure(move |_| on_failure())
}

/// Register counting listeners on a circuit breaker builder.
pub fn count_breaker_listeners<R>(
    stats: &Arc<ListenerStats>,
    builder: CircuitBreakerBuilder<R, StubError>,
) -> CircuitBreakerBuilder<R, StubError>
where
    R: Clone + Send + Sync + 'static,
{
    let on_open = bump(stats, |s| &s.open);
    let on_close = bump(stats, |s| &s.close);
    let on_half_open = bump(stats, |s| &s.half_open);
    let on_success = bump(stats, |s| &s.cb_success);
    let on_failure = bump(stats, |s| &s.cb_failure);
    builder
        .on_open(move |_| on_open())
        .on_close(move |_| on_close())
        .on_half_open(move |_| on_half_open())
        .on_success(move |_| on_success())
        .on_failure(move |_| on_failure())
}

/// Register counting listeners on a fallback builder.
pub fn count_fallback_listeners<R>(
    stats: &Arc<ListenerStats>,
    builder: FallbackBuilder<R, StubError>,
) -> FallbackBuilder<R, StubError>
where
    R: Clone + Send + Sync + 'static,
{
    let on_failed = bump(stats, |s| &s.fb_failed_attempt);
    let on_success = bump(stats, |s| &s.fb_success);
    let on_failure = bump(stats, |s| &s.fb_failure);
    builder
        .on_failed_attempt(move |_| on_failed())
        .on_success(move |_| on_success())
        .on_failure(move |_| on_failure())
}

/// Register counting listeners on an executor.
pub fn count_executor_listeners<R>(
    stats: &Arc<ListenerStats>,
    executor: Executor<R, StubError>,
) -> Executor<R, StubError>
where
    R: Clone + Send + Sync + 'static,
{
    let on_complete = bump(stats, |s| &s.complete);
    let on_success = bump(stats, |s| &s.success);
    let on_failure = bump(stats, |s| &s.failure);
    executor
        .on_complete(move |_| on_complete())
        .on_success(move |_| on_success())
        .on_failure(move |_| on_failure())
}
