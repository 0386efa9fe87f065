//! Circuit breaker policy.
//!
//! A three-state machine guarded by a single lock: Closed records outcomes
//! into a sliding window and opens when the failure threshold is met; Open
//! short-circuits calls until the configured delay has elapsed, then admits
//! a budget of half-open trials; HalfOpen closes on enough successes and
//! reopens on failure. The wrapped call always runs with the lock released,
//! and state-change listeners fire after the lock is dropped.
//!
//! Breaker state is shared: clones of a breaker (and every executor they are
//! added to) observe and mutate the same window and phase.

use crate::clock::{Clock, MonotonicClock};
use crate::events::CompletedEvent;
use crate::execution::Execution;
use crate::outcome::PolicyOutcome;
use crate::policy::{AttemptFn, Policy, PolicyCore};
use crate::window::SlidingCounter;
use crate::FaultError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Phase of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Delivered to `on_open` / `on_close` / `on_half_open` listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChangedEvent {
    pub previous: CircuitState,
    pub current: CircuitState,
}

/// Errors returned by breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroThreshold,
    RatioOutOfRange { required: usize, capacity: usize },
    InvalidRate(u8),
    ZeroExecutionFloor,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroThreshold => write!(f, "threshold must be greater than zero"),
            ConfigError::RatioOutOfRange { required, capacity } => {
                write!(f, "threshold {} must not exceed window size {}", required, capacity)
            }
            ConfigError::InvalidRate(rate) => {
                write!(f, "failure rate must be in 1..=100 (got {})", rate)
            }
            ConfigError::ZeroExecutionFloor => {
                write!(f, "minimum executions for a rate threshold must be positive")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Default time a breaker stays open before admitting trial executions.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum FailureThreshold {
    /// Open once `required` failures are recorded among the last `capacity`
    /// executions.
    Count { required: usize, capacity: usize },
    /// Open once the failure rate over a time window reaches `rate_percent`,
    /// with at least `min_executions` recorded.
    Rate { rate_percent: u8, min_executions: usize, period: Duration },
}

#[derive(Debug, Clone, Copy)]
struct SuccessThreshold {
    required: usize,
    capacity: usize,
}

struct BreakerConfig {
    failure_threshold: FailureThreshold,
    success_threshold: SuccessThreshold,
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl BreakerConfig {
    fn closed_window(&self) -> SlidingCounter {
        match &self.failure_threshold {
            FailureThreshold::Count { capacity, .. } => SlidingCounter::count(*capacity),
            FailureThreshold::Rate { period, .. } => {
                SlidingCounter::time(*period, self.clock.clone())
            }
        }
    }

    fn trial_window(&self) -> SlidingCounter {
        SlidingCounter::count(self.success_threshold.capacity)
    }

    fn trial_permits(&self) -> usize {
        self.success_threshold.capacity.max(1)
    }
}

/// Mutable breaker state; one lock guards all of it.
struct BreakerState {
    state: CircuitState,
    window: SlidingCounter,
    opened_at: Option<u64>,
    permits_in_use: usize,
}

type StateListener = Arc<dyn Fn(StateChangedEvent) + Send + Sync>;

/// Circuit breaker policy parameterized on the executor's result and error
/// types.
///
/// Defaults: one failure opens, one success closes, [`DEFAULT_DELAY`] open
/// time. A delay of zero means the next call after opening immediately runs
/// as a half-open trial.
pub struct CircuitBreaker<R, E> {
    core: PolicyCore<R, E>,
    config: Arc<BreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
    on_open: Option<StateListener>,
    on_close: Option<StateListener>,
    on_half_open: Option<StateListener>,
}

impl<R, E> Clone for CircuitBreaker<R, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            on_open: self.on_open.clone(),
            on_close: self.on_close.clone(),
            on_half_open: self.on_half_open.clone(),
        }
    }
}

impl<R, E> std::fmt::Debug for CircuitBreaker<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state.lock().unwrap().state)
            .field("delay", &self.config.delay)
            .finish()
    }
}

/// Holds one half-open trial slot; releasing saturates so a manual state
/// change that reset the counter cannot underflow it.
struct TrialPermit {
    state: Arc<Mutex<BreakerState>>,
}

impl Drop for TrialPermit {
    fn drop(&mut self) {
        let mut guard = self.state.lock().unwrap();
        guard.permits_in_use = guard.permits_in_use.saturating_sub(1);
    }
}

impl<R, E> CircuitBreaker<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn builder() -> CircuitBreakerBuilder<R, E> {
        CircuitBreakerBuilder::new()
    }

    /// Convenience constructor: open after `failures` consecutive failures,
    /// stay open for `delay`.
    pub fn new(failures: usize, delay: Duration) -> Result<Self, ConfigError> {
        Ok(Self::builder().failure_threshold(failures)?.delay(delay).build())
    }

    /// Current phase.
    pub fn state(&self) -> CircuitState {
        self.state.lock().unwrap().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Manually open the breaker. In-flight trials keep running; their
    /// outcomes are recorded against the new state.
    pub fn open(&self) {
        self.manual_transition(CircuitState::Open);
    }

    /// Manually close the breaker, resetting its window.
    pub fn close(&self) {
        self.manual_transition(CircuitState::Closed);
    }

    /// Manually move the breaker to half-open.
    pub fn half_open(&self) {
        self.manual_transition(CircuitState::HalfOpen);
    }

    /// Executions recorded in the current window.
    pub fn executions(&self) -> usize {
        self.state.lock().unwrap().window.executions()
    }

    /// Failures recorded in the current window.
    pub fn failures(&self) -> usize {
        self.state.lock().unwrap().window.failures()
    }

    /// Successes recorded in the current window.
    pub fn successes(&self) -> usize {
        self.state.lock().unwrap().window.successes()
    }

    /// Failure rate over the current window, in `[0, 1]`.
    pub fn failure_rate(&self) -> f64 {
        self.state.lock().unwrap().window.failure_rate()
    }

    fn manual_transition(&self, to: CircuitState) {
        let event = {
            let mut guard = self.state.lock().unwrap();
            self.transition_locked(&mut guard, to)
        };
        self.emit_state_change(event);
    }

    /// Move to `to`, rebuilding the window and resetting permits as the new
    /// phase requires. Must be called with the lock held; the returned event
    /// is emitted by the caller after unlocking.
    fn transition_locked(
        &self,
        guard: &mut BreakerState,
        to: CircuitState,
    ) -> Option<StateChangedEvent> {
        let from = guard.state;
        if from == to {
            return None;
        }
        guard.state = to;
        guard.permits_in_use = 0;
        match to {
            CircuitState::Closed => {
                guard.window = self.config.closed_window();
                guard.opened_at = None;
                tracing::info!("circuit breaker closed");
            }
            CircuitState::Open => {
                guard.opened_at = Some(self.config.clock.now_millis());
                tracing::warn!(failures = guard.window.failures(), "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                guard.window = self.config.trial_window();
                guard.opened_at = None;
                tracing::info!(
                    permits = self.config.trial_permits(),
                    "circuit breaker half-open"
                );
            }
        }
        Some(StateChangedEvent { previous: from, current: to })
    }

    fn emit_state_change(&self, event: Option<StateChangedEvent>) {
        let Some(event) = event else { return };
        let listener = match event.current {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };
        if let Some(listener) = listener {
            listener(event);
        }
    }

    /// Pre-execution check: decide whether the call may run, acquiring a
    /// trial permit when in (or transitioning into) half-open.
    fn try_acquire(&self) -> Result<Option<TrialPermit>, PolicyOutcome<R, E>> {
        let (admitted, event) = {
            let mut guard = self.state.lock().unwrap();
            match guard.state {
                CircuitState::Closed => (Ok(None), None),
                CircuitState::Open => {
                    let now = self.config.clock.now_millis();
                    let opened_at = guard.opened_at.unwrap_or(now);
                    let elapsed = now.saturating_sub(opened_at);
                    if elapsed >= self.config.delay.as_millis() as u64 {
                        let event = self.transition_locked(&mut guard, CircuitState::HalfOpen);
                        guard.permits_in_use += 1;
                        (Ok(Some(self.permit())), event)
                    } else {
                        let rejection = PolicyOutcome::short_circuit(FaultError::CircuitOpen {
                            failure_count: guard.window.failures(),
                            open_duration: Duration::from_millis(elapsed),
                        });
                        (Err(rejection), None)
                    }
                }
                CircuitState::HalfOpen => {
                    if guard.permits_in_use < self.config.trial_permits() {
                        guard.permits_in_use += 1;
                        tracing::debug!(
                            in_flight = guard.permits_in_use,
                            max = self.config.trial_permits(),
                            "circuit breaker trial admitted"
                        );
                        (Ok(Some(self.permit())), None)
                    } else {
                        let rejection = PolicyOutcome::short_circuit(FaultError::CircuitOpen {
                            failure_count: guard.window.failures(),
                            open_duration: Duration::ZERO,
                        });
                        (Err(rejection), None)
                    }
                }
            }
        };
        self.emit_state_change(event);
        admitted
    }

    fn permit(&self) -> TrialPermit {
        TrialPermit { state: self.state.clone() }
    }

    /// Record an adjudicated outcome into the window and apply threshold
    /// transitions. Listeners fire after the lock is released.
    fn record_result(&self, success: bool) {
        let event = {
            let mut guard = self.state.lock().unwrap();
            guard.window.record(success);
            match guard.state {
                CircuitState::Closed => {
                    if !success && self.failure_threshold_met(&mut guard) {
                        self.transition_locked(&mut guard, CircuitState::Open)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    let threshold = self.config.success_threshold;
                    let successes = guard.window.successes();
                    let failures = guard.window.failures();
                    if successes >= threshold.required {
                        self.transition_locked(&mut guard, CircuitState::Closed)
                    } else if failures > threshold.capacity - threshold.required {
                        // The success threshold can no longer be met within
                        // this trial window.
                        self.transition_locked(&mut guard, CircuitState::Open)
                    } else {
                        None
                    }
                }
                // A manual open raced an in-flight trial; the outcome stays
                // recorded but forces no further transition.
                CircuitState::Open => None,
            }
        };
        self.emit_state_change(event);
    }

    fn failure_threshold_met(&self, guard: &mut BreakerState) -> bool {
        match &self.config.failure_threshold {
            FailureThreshold::Count { required, .. } => guard.window.failures() >= *required,
            FailureThreshold::Rate { rate_percent, min_executions, .. } => {
                guard.window.executions() >= *min_executions
                    && guard.window.failure_rate() * 100.0 >= *rate_percent as f64
            }
        }
    }
}

impl<R, E> Policy<R, E> for CircuitBreaker<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    fn apply(&self, _index: usize, inner: AttemptFn<R, E>) -> AttemptFn<R, E> {
        let policy = self.clone();
        Arc::new(move |exec: Execution<R, E>| {
            let policy = policy.clone();
            let inner = inner.clone();
            Box::pin(async move {
                if let Some(out) = exec.canceled_outcome() {
                    return out;
                }
                let permit = match policy.try_acquire() {
                    Ok(permit) => permit,
                    Err(rejection) => return rejection,
                };

                let outcome = inner(exec.clone()).await;
                if exec.is_canceled() {
                    drop(permit);
                    return exec.canceled_outcome().unwrap_or(outcome);
                }

                let adjudicated = policy.core.adjudicate(
                    &exec,
                    outcome,
                    |_| policy.record_result(true),
                    |rejected| {
                        policy.record_result(false);
                        rejected
                    },
                );
                drop(permit);
                adjudicated
            })
        })
    }
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder<R, E> {
    core: PolicyCore<R, E>,
    failure_threshold: FailureThreshold,
    success_threshold: SuccessThreshold,
    delay: Duration,
    clock: Arc<dyn Clock>,
    on_open: Option<StateListener>,
    on_close: Option<StateListener>,
    on_half_open: Option<StateListener>,
}

impl<R, E> CircuitBreakerBuilder<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            core: PolicyCore::new(),
            failure_threshold: FailureThreshold::Count { required: 1, capacity: 1 },
            success_threshold: SuccessThreshold { required: 1, capacity: 1 },
            delay: DEFAULT_DELAY,
            clock: Arc::new(MonotonicClock::new()),
            on_open: None,
            on_close: None,
            on_half_open: None,
        }
    }

    /// Open after `failures` failures among the last `failures` executions.
    pub fn failure_threshold(self, failures: usize) -> Result<Self, ConfigError> {
        self.failure_threshold_ratio(failures, failures)
    }

    /// Open after `failures` failures among the last `executions` executions.
    pub fn failure_threshold_ratio(
        mut self,
        failures: usize,
        executions: usize,
    ) -> Result<Self, ConfigError> {
        if failures == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if failures > executions {
            return Err(ConfigError::RatioOutOfRange { required: failures, capacity: executions });
        }
        self.failure_threshold = FailureThreshold::Count { required: failures, capacity: executions };
        Ok(self)
    }

    /// Open once the failure rate over a time window of `period` reaches
    /// `rate_percent`, with at least `min_executions` recorded.
    pub fn failure_rate_threshold(
        mut self,
        rate_percent: u8,
        min_executions: usize,
        period: Duration,
    ) -> Result<Self, ConfigError> {
        if rate_percent == 0 || rate_percent > 100 {
            return Err(ConfigError::InvalidRate(rate_percent));
        }
        if min_executions == 0 {
            return Err(ConfigError::ZeroExecutionFloor);
        }
        self.failure_threshold =
            FailureThreshold::Rate { rate_percent, min_executions, period };
        Ok(self)
    }

    /// Close after `successes` successful trials in half-open.
    pub fn success_threshold(self, successes: usize) -> Result<Self, ConfigError> {
        self.success_threshold_ratio(successes, successes)
    }

    /// Close after `successes` successes among `executions` half-open
    /// trials; the trial budget equals `executions`.
    pub fn success_threshold_ratio(
        mut self,
        successes: usize,
        executions: usize,
    ) -> Result<Self, ConfigError> {
        if successes == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if successes > executions {
            return Err(ConfigError::RatioOutOfRange {
                required: successes,
                capacity: executions,
            });
        }
        self.success_threshold = SuccessThreshold { required: successes, capacity: executions };
        Ok(self)
    }

    /// How long the breaker stays open before admitting trial executions.
    /// Zero means the next call after opening runs immediately as a trial.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Substitute the time source (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Count operation errors matching `predicate` as failures.
    pub fn handle_error_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.core.classifier.handle_error_if(predicate);
        self
    }

    /// Count the exact result `value` as a failure.
    pub fn handle_result(mut self, value: R) -> Self
    where
        R: PartialEq,
    {
        self.core.classifier.handle_result(value);
        self
    }

    /// Count results matching `predicate` as failures.
    pub fn handle_result_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.core.classifier.handle_result_if(predicate);
        self
    }

    /// Count outcomes matching `predicate` as failures.
    pub fn handle_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync + 'static,
    {
        self.core.classifier.handle_if(predicate);
        self
    }

    pub fn on_open<F>(mut self, listener: F) -> Self
    where
        F: Fn(StateChangedEvent) + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(listener));
        self
    }

    pub fn on_close<F>(mut self, listener: F) -> Self
    where
        F: Fn(StateChangedEvent) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(listener));
        self
    }

    pub fn on_half_open<F>(mut self, listener: F) -> Self
    where
        F: Fn(StateChangedEvent) + Send + Sync + 'static,
    {
        self.on_half_open = Some(Arc::new(listener));
        self
    }

    /// Called for every attempt this breaker accepts.
    pub fn on_success<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.core.on_success = Some(Arc::new(listener));
        self
    }

    /// Called for every attempt this breaker counts as a failure.
    pub fn on_failure<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.core.on_failure = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> CircuitBreaker<R, E> {
        let config = Arc::new(BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            delay: self.delay,
            clock: self.clock,
        });
        let window = config.closed_window();
        CircuitBreaker {
            core: self.core,
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                permits_in_use: 0,
            })),
            on_open: self.on_open,
            on_close: self.on_close,
            on_half_open: self.on_half_open,
        }
    }
}

impl<R, E> Default for CircuitBreakerBuilder<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
