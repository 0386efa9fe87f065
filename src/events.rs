//! Event payloads delivered to policy and executor listeners.
//!
//! All events are snapshots: they carry owned copies of the execution's
//! counters and last outcome at the moment they were built, so listeners can
//! hold them without touching live state.

use crate::FaultError;
use std::time::Duration;

/// Snapshot delivered for per-attempt listeners (`on_failed_attempt`,
/// `on_retry`).
#[derive(Debug, Clone)]
pub struct AttemptEvent<R, E> {
    /// Value produced by the most recent attempt, if any.
    pub last_value: Option<R>,
    /// Error produced by the most recent attempt, if any.
    pub last_error: Option<FaultError<E>>,
    /// Attempts so far, counting the current one (1-based).
    pub attempts: usize,
    /// Times the user function actually ran.
    pub executions: usize,
    /// Time since the execution started.
    pub elapsed: Duration,
    /// Time since the current attempt started.
    pub elapsed_attempt: Duration,
    pub is_first_attempt: bool,
    pub is_retry: bool,
}

/// Snapshot delivered when a retry has been scheduled but not yet started.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<R, E> {
    /// The attempt snapshot at scheduling time.
    pub attempt: AttemptEvent<R, E>,
    /// How long the policy will suspend before the next attempt.
    pub delay: Duration,
}

impl<R, E> ScheduledEvent<R, E> {
    /// Time since the attempt that triggered this scheduling started.
    pub fn elapsed_attempt(&self) -> Duration {
        self.attempt.elapsed_attempt
    }
}

/// Snapshot delivered when a policy or the executor considers the execution
/// finished.
#[derive(Debug, Clone)]
pub struct CompletedEvent<R, E> {
    /// Final value, if the execution produced one.
    pub value: Option<R>,
    /// Final error, if the execution failed.
    pub error: Option<FaultError<E>>,
    /// Total attempts over the execution's lifetime.
    pub attempts: usize,
    /// Total times the user function ran.
    pub executions: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
    pub is_first_attempt: bool,
    pub is_retry: bool,
}
