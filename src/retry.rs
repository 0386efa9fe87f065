//! Retry policy.
//!
//! Wraps the composed inner function in an attempt loop: classify the
//! outcome, stop on unhandled outcomes or abort conditions, otherwise
//! suspend per the configured backoff/jitter (waking early on cancellation)
//! and try again until attempts or time run out.

use crate::backoff::Backoff;
use crate::classifier::FailureClassifier;
use crate::events::{AttemptEvent, CompletedEvent, ScheduledEvent};
use crate::execution::Execution;
use crate::jitter::Jitter;
use crate::outcome::PolicyOutcome;
use crate::policy::{
    AttemptFn, AttemptListener, CompletionListener, Policy, PolicyCore, ScheduledListener,
};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::FaultError;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts (two retries after the initial call).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Errors returned by retry configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum BuildError {
    InvalidMaxAttempts(usize),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Retry policy with backoff, jitter, abort conditions, and a pluggable
/// sleeper.
///
/// Defaults: 3 attempts, no delay ([`Backoff::none`]), full jitter (a no-op
/// at zero delay), no abort conditions, failures classified as "any error".
pub struct RetryPolicy<R, E> {
    core: PolicyCore<R, E>,
    abort: FailureClassifier<R, E>,
    max_attempts: usize,
    max_duration: Option<Duration>,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    wrap_exhausted: bool,
    on_failed_attempt: Option<AttemptListener<R, E>>,
    on_retry: Option<AttemptListener<R, E>>,
    on_retry_scheduled: Option<ScheduledListener<R, E>>,
    on_retries_exceeded: Option<CompletionListener<R, E>>,
    on_abort: Option<CompletionListener<R, E>>,
}

impl<R, E> Clone for RetryPolicy<R, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            abort: self.abort.clone(),
            max_attempts: self.max_attempts,
            max_duration: self.max_duration,
            backoff: self.backoff.clone(),
            jitter: self.jitter.clone(),
            sleeper: self.sleeper.clone(),
            wrap_exhausted: self.wrap_exhausted,
            on_failed_attempt: self.on_failed_attempt.clone(),
            on_retry: self.on_retry.clone(),
            on_retry_scheduled: self.on_retry_scheduled.clone(),
            on_retries_exceeded: self.on_retries_exceeded.clone(),
            on_abort: self.on_abort.clone(),
        }
    }
}

impl<R, E> std::fmt::Debug for RetryPolicy<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("max_duration", &self.max_duration)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl<R, E> RetryPolicy<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn builder() -> RetryPolicyBuilder<R, E> {
        RetryPolicyBuilder::new()
    }

    async fn run(&self, inner: AttemptFn<R, E>, exec: Execution<R, E>) -> PolicyOutcome<R, E> {
        let mut recorded: Vec<E> = Vec::new();

        loop {
            if let Some(out) = exec.canceled_outcome() {
                return out;
            }

            let outcome = inner(exec.clone()).await;
            if exec.is_canceled() {
                return exec.canceled_outcome().unwrap_or(outcome);
            }

            if !self.core.is_failure(&outcome) {
                let accepted = outcome.with_success();
                if let Some(listener) = &self.core.on_success {
                    listener(exec.completed_event(&accepted));
                }
                return accepted;
            }

            if self.wrap_exhausted {
                if let Some(FaultError::Inner(e)) = &outcome.error {
                    recorded.push(e.clone());
                    if recorded.len() > crate::error::MAX_RECORDED_FAILURES {
                        recorded.remove(0);
                    }
                }
            }

            if let Some(listener) = &self.on_failed_attempt {
                listener(exec.attempt_event());
            }

            if self.abort.matches(outcome.value.as_ref(), outcome.error.as_ref()) {
                let rejected = outcome.with_failure();
                if let Some(listener) = &self.on_abort {
                    listener(exec.completed_event(&rejected));
                }
                if let Some(listener) = &self.core.on_failure {
                    listener(exec.completed_event(&rejected));
                }
                return rejected;
            }

            let attempts = exec.attempts();
            let out_of_attempts = attempts >= self.max_attempts;
            let out_of_time = self.max_duration.is_some_and(|d| exec.elapsed() >= d);
            if out_of_attempts || out_of_time {
                let mut rejected = outcome.with_failure();
                if self.wrap_exhausted {
                    rejected.value = None;
                    rejected.error = Some(FaultError::retries_exceeded(
                        attempts,
                        std::mem::take(&mut recorded),
                    ));
                }
                if let Some(listener) = &self.on_retries_exceeded {
                    listener(exec.completed_event(&rejected));
                }
                if let Some(listener) = &self.core.on_failure {
                    listener(exec.completed_event(&rejected));
                }
                return rejected;
            }

            let delay = self.jitter.apply(self.backoff.delay(attempts));
            if let Some(listener) = &self.on_retry_scheduled {
                listener(exec.scheduled_event(delay));
            }

            // Suspend on the sleeper, but wake immediately if anything
            // records a cancellation.
            let mut canceled = exec.cancel_watch();
            tokio::select! {
                _ = self.sleeper.sleep(delay) => {}
                _ = canceled.wait_for(|c| *c) => {}
            }
            if let Some(out) = exec.canceled_outcome() {
                return out;
            }

            exec.initialize_attempt();
            if let Some(listener) = &self.on_retry {
                listener(exec.attempt_event());
            }
        }
    }
}

impl<R, E> Policy<R, E> for RetryPolicy<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    fn apply(&self, _index: usize, inner: AttemptFn<R, E>) -> AttemptFn<R, E> {
        let policy = self.clone();
        Arc::new(move |exec: Execution<R, E>| {
            let policy = policy.clone();
            let inner = inner.clone();
            Box::pin(async move { policy.run(inner, exec).await })
        })
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<R, E> {
    policy: RetryPolicy<R, E>,
}

impl<R, E> RetryPolicyBuilder<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy {
                core: PolicyCore::new(),
                abort: FailureClassifier::new(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                max_duration: None,
                backoff: Backoff::none(),
                jitter: Jitter::full(),
                sleeper: Arc::new(TokioSleeper),
                wrap_exhausted: false,
                on_failed_attempt: None,
                on_retry: None,
                on_retry_scheduled: None,
                on_retries_exceeded: None,
                on_abort: None,
            },
        }
    }

    /// Total attempts including the initial call. Must be positive.
    pub fn max_attempts(mut self, attempts: usize) -> Result<Self, BuildError> {
        if attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(attempts));
        }
        self.policy.max_attempts = attempts;
        Ok(self)
    }

    /// Retries after the initial call; `max_retries(n)` equals
    /// `max_attempts(n + 1)`.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.policy.max_attempts = retries.saturating_add(1);
        self
    }

    /// Stop retrying once the execution has been running this long.
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.policy.max_duration = Some(duration);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.policy.jitter = jitter;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.policy.sleeper = Arc::new(sleeper);
        self
    }

    /// Retry on operation errors matching `predicate`.
    pub fn handle_error_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_error_if(predicate);
        self
    }

    /// Retry when the operation returns exactly `value`.
    pub fn handle_result(mut self, value: R) -> Self
    where
        R: PartialEq,
    {
        self.policy.core.classifier.handle_result(value);
        self
    }

    /// Retry on results matching `predicate`.
    pub fn handle_result_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_result_if(predicate);
        self
    }

    /// Retry on outcomes matching `predicate`.
    pub fn handle_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_if(predicate);
        self
    }

    /// Give up immediately (no further retries) on operation errors matching
    /// `predicate`.
    pub fn abort_on_error_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.policy.abort.handle_error_if(predicate);
        self
    }

    /// Give up immediately when the operation returns exactly `value`.
    pub fn abort_on_result(mut self, value: R) -> Self
    where
        R: PartialEq,
    {
        self.policy.abort.handle_result(value);
        self
    }

    /// Give up immediately on outcomes matching `predicate`.
    pub fn abort_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync + 'static,
    {
        self.policy.abort.handle_if(predicate);
        self
    }

    /// Return a [`FaultError::RetriesExceeded`] wrapper instead of the last
    /// underlying error when attempts run out.
    pub fn with_exhausted_error(mut self) -> Self {
        self.policy.wrap_exhausted = true;
        self
    }

    pub fn on_failed_attempt<F>(mut self, listener: F) -> Self
    where
        F: Fn(AttemptEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_failed_attempt = Some(Arc::new(listener));
        self
    }

    pub fn on_retry<F>(mut self, listener: F) -> Self
    where
        F: Fn(AttemptEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_retry = Some(Arc::new(listener));
        self
    }

    pub fn on_retry_scheduled<F>(mut self, listener: F) -> Self
    where
        F: Fn(ScheduledEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_retry_scheduled = Some(Arc::new(listener));
        self
    }

    pub fn on_retries_exceeded<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_retries_exceeded = Some(Arc::new(listener));
        self
    }

    pub fn on_abort<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_abort = Some(Arc::new(listener));
        self
    }

    /// Called once when this policy accepts the final outcome.
    pub fn on_success<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.core.on_success = Some(Arc::new(listener));
        self
    }

    /// Called once when this policy gives up (retries exceeded or abort).
    pub fn on_failure<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.core.on_failure = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> RetryPolicy<R, E> {
        self.policy
    }
}

impl<R, E> Default for RetryPolicyBuilder<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
