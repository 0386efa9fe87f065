#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Backstop
//!
//! Composable fault-handling policies for async Rust: retries, circuit
//! breakers, and fallbacks wrapped around an operation by a generic
//! executor.
//!
//! ## Features
//!
//! - **Policy composition**: an [`Executor`] layers policies
//!   outermost-to-innermost around the operation; each layer adjudicates the
//!   outcomes already decided by the layers inside it.
//! - **Retry** with backoff strategies, jitter, abort conditions, and
//!   elapsed-time limits.
//! - **Circuit breakers** with count- or time-based sliding windows,
//!   half-open trial budgets, and manual control.
//! - **Fallbacks** substituting handled failures with a value, error, or
//!   function of the failed attempt.
//! - **Failure classification** per policy: errors, result values, or
//!   arbitrary predicates.
//! - **Events** at every step: failed attempts, scheduled retries, breaker
//!   state changes, and per-execution completion.
//! - **Cooperative cancellation** that wakes pending retry delays and stops
//!   further attempts.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use backstop::{Backoff, CircuitBreaker, Executor, FaultError, Jitter, RetryPolicy};
//!
//! #[derive(Debug, Clone)]
//! struct TransientError;
//! # impl std::fmt::Display for TransientError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//! #         write!(f, "transient failure")
//! #     }
//! # }
//! # impl std::error::Error for TransientError {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), FaultError<TransientError>> {
//!     let attempts = Arc::new(AtomicUsize::new(0));
//!
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .expect("max_attempts > 0")
//!         .backoff(Backoff::exponential(Duration::from_millis(10)))
//!         .with_jitter(Jitter::full())
//!         .build();
//!     let breaker = CircuitBreaker::new(5, Duration::from_secs(30))
//!         .expect("valid breaker configuration");
//!
//!     let value = Executor::new()
//!         .with_policy(retry)
//!         .with_policy(breaker)
//!         .execute(move || {
//!             let attempts = attempts.clone();
//!             async move {
//!                 if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
//!                     Err(FaultError::Inner(TransientError))
//!                 } else {
//!                     Ok(42)
//!                 }
//!             }
//!         })
//!         .await?;
//!
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod events;
pub mod execution;
pub mod executor;
pub mod fallback;
pub mod jitter;
pub mod outcome;
pub mod policy;
pub mod retry;
pub mod sleeper;
mod window;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitState, ConfigError, StateChangedEvent,
};
pub use classifier::FailureClassifier;
pub use clock::{Clock, MonotonicClock};
pub use error::{CancelSource, FaultError};
pub use events::{AttemptEvent, CompletedEvent, ScheduledEvent};
pub use execution::{CancelSignal, Cancellation, Execution};
pub use executor::{execute, spawn, ExecutionHandle, Executor};
pub use fallback::{Fallback, FallbackBuilder};
pub use jitter::Jitter;
pub use outcome::PolicyOutcome;
pub use policy::Policy;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
/// Sleep abstractions: `Sleeper` trait, `TokioSleeper` for production,
/// `InstantSleeper`/`TrackingSleeper` for tests.
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
