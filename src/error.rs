//! Error types shared by all policies.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cap on the number of failures retained by `RetriesExceeded` to avoid unbounded growth.
pub const MAX_RECORDED_FAILURES: usize = 10;

/// Where a cancellation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The user-supplied cancellation signal fired.
    Signal,
    /// A policy layer canceled the execution; carries the layer index
    /// (0 = innermost).
    Layer(usize),
}

/// Unified error type flowing through every policy layer.
///
/// The user function's own failures travel as [`FaultError::Inner`] and are
/// passed through verbatim unless a fallback substitutes them. The remaining
/// variants are produced by the library itself.
#[derive(Debug, Clone)]
pub enum FaultError<E> {
    /// The underlying operation failed.
    Inner(E),
    /// A circuit breaker short-circuited the call without invoking it.
    CircuitOpen {
        /// Recorded failures in the breaker's window when it opened.
        failure_count: usize,
        /// How long the breaker had been open when the call was rejected.
        open_duration: Duration,
    },
    /// The execution was canceled before it produced an outcome.
    Canceled { source: CancelSource },
    /// All retry attempts were used up (opt-in wrapper; by default the last
    /// underlying error is returned instead).
    RetriesExceeded { attempts: usize, failures: Arc<Vec<E>> },
}

impl<E: fmt::Display> fmt::Display for FaultError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner(e) => write!(f, "{}", e),
            Self::CircuitOpen { failure_count, open_duration } => {
                write!(
                    f,
                    "circuit breaker open ({} recorded failures, open for {:?})",
                    failure_count, open_duration
                )
            }
            Self::Canceled { source } => match source {
                CancelSource::Signal => write!(f, "execution canceled by signal"),
                CancelSource::Layer(index) => {
                    write!(f, "execution canceled by policy layer {}", index)
                }
            },
            Self::RetriesExceeded { attempts, failures } => {
                if let Some(last) = failures.last() {
                    write!(f, "retries exceeded after {} attempts; last error: {}", attempts, last)
                } else {
                    write!(f, "retries exceeded after {} attempts", attempts)
                }
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for FaultError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetriesExceeded { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl<E> FaultError<E> {
    /// Build a `RetriesExceeded` while keeping only the most recent
    /// `MAX_RECORDED_FAILURES` failures.
    pub fn retries_exceeded(attempts: usize, failures: Vec<E>) -> Self {
        let trimmed = if failures.len() > MAX_RECORDED_FAILURES {
            failures.into_iter().rev().take(MAX_RECORDED_FAILURES).rev().collect()
        } else {
            failures
        };
        FaultError::RetriesExceeded { attempts, failures: Arc::new(trimmed) }
    }

    /// Check whether this error wraps the operation's own error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Check whether a circuit breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check whether the execution was canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Check whether retries were exceeded (opt-in wrapper only).
    pub fn is_retries_exceeded(&self) -> bool {
        matches!(self, Self::RetriesExceeded { .. })
    }

    /// Extract the operation's own error, if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the operation's own error, if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Cancellation origin, if this is a cancellation error.
    pub fn cancel_source(&self) -> Option<CancelSource> {
        match self {
            Self::Canceled { source } => Some(*source),
            _ => None,
        }
    }

    /// Recorded failures for `RetriesExceeded`, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetriesExceeded { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }
}
