//! Composition contracts shared by every policy.
//!
//! At execution time the executor folds its policies right-to-left around a
//! terminal function, so policies only ever see the [`AttemptFn`] shape: a
//! function from the execution handle to an attempt outcome. Each policy's
//! [`Policy::apply`] returns a new such function wrapping the inner one.
//!
//! [`PolicyCore`] carries the pieces every policy shares: its failure
//! classifier and its completion listeners, plus the adjudication step that
//! classifies an inner outcome, runs the policy-specific hook, and dispatches
//! the matching listener.

use crate::classifier::FailureClassifier;
use crate::events::CompletedEvent;
use crate::execution::Execution;
use crate::outcome::PolicyOutcome;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future used by composed attempt functions.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One layer of the composed execution: invoked once per attempt by the
/// layer outside it (or by the executor for the outermost layer).
pub type AttemptFn<R, E> =
    Arc<dyn Fn(Execution<R, E>) -> BoxFuture<PolicyOutcome<R, E>> + Send + Sync>;

/// A fault-handling strategy that wraps an inner attempt function.
///
/// Policies listed outermost-to-innermost compose into
/// `P0(P1(...Pn(operation)...))`; outcomes bubble back outward, each layer
/// seeing verdicts already made by the layers inside it.
pub trait Policy<R, E>: Send + Sync
where
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap `inner` with this policy's behavior. `index` is the layer's
    /// position in the composition (0 = innermost) and identifies the layer
    /// in cancellation records.
    fn apply(&self, index: usize, inner: AttemptFn<R, E>) -> AttemptFn<R, E>;
}

pub(crate) type CompletionListener<R, E> = Arc<dyn Fn(CompletedEvent<R, E>) + Send + Sync>;
pub(crate) type AttemptListener<R, E> =
    Arc<dyn Fn(crate::events::AttemptEvent<R, E>) + Send + Sync>;
pub(crate) type ScheduledListener<R, E> =
    Arc<dyn Fn(crate::events::ScheduledEvent<R, E>) + Send + Sync>;

/// Classifier and completion listeners common to every policy.
pub(crate) struct PolicyCore<R, E> {
    pub(crate) classifier: FailureClassifier<R, E>,
    pub(crate) on_success: Option<CompletionListener<R, E>>,
    pub(crate) on_failure: Option<CompletionListener<R, E>>,
}

impl<R, E> Clone for PolicyCore<R, E> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<R, E> PolicyCore<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self { classifier: FailureClassifier::new(), on_success: None, on_failure: None }
    }

    pub(crate) fn is_failure(&self, outcome: &PolicyOutcome<R, E>) -> bool {
        self.classifier.is_failure(outcome.value.as_ref(), outcome.error.as_ref())
    }

    /// Adjudicate an inner outcome: classify it, run the matching hook, and
    /// dispatch this policy's completion listener on the adjudicated result.
    ///
    /// `on_accepted` observes an accepted outcome (e.g. the breaker records
    /// a success); `on_rejected` may transform a rejected one (e.g. the
    /// fallback substitutes it) and its return value decides which listener
    /// fires.
    pub(crate) fn adjudicate(
        &self,
        exec: &Execution<R, E>,
        outcome: PolicyOutcome<R, E>,
        on_accepted: impl FnOnce(&PolicyOutcome<R, E>),
        on_rejected: impl FnOnce(PolicyOutcome<R, E>) -> PolicyOutcome<R, E>,
    ) -> PolicyOutcome<R, E> {
        let adjudicated = if self.is_failure(&outcome) {
            on_rejected(outcome.with_failure())
        } else {
            let accepted = outcome.with_success();
            on_accepted(&accepted);
            accepted
        };
        let listener = if adjudicated.success { &self.on_success } else { &self.on_failure };
        if let Some(listener) = listener {
            listener(exec.completed_event(&adjudicated));
        }
        adjudicated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn adjudicate_accepts_and_fires_success_listener() {
        let successes = Arc::new(AtomicUsize::new(0));
        let mut core: PolicyCore<u32, TestError> = PolicyCore::new();
        let counter = successes.clone();
        core.on_success = Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let exec: Execution<u32, TestError> = Execution::new();
        exec.initialize_attempt();

        let hook_seen = Arc::new(AtomicUsize::new(0));
        let hook = hook_seen.clone();
        let out = core.adjudicate(
            &exec,
            PolicyOutcome::from_value(5),
            |_| {
                hook.fetch_add(1, Ordering::SeqCst);
            },
            |rejected| rejected,
        );

        assert!(out.success && out.success_all);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(hook_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adjudicate_lets_the_rejection_hook_transform_the_outcome() {
        let failures = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let mut core: PolicyCore<u32, TestError> = PolicyCore::new();
        let f = failures.clone();
        core.on_failure = Some(Arc::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = successes.clone();
        core.on_success = Some(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        let exec: Execution<u32, TestError> = Execution::new();
        exec.initialize_attempt();

        // A rejected outcome transformed into a success (a fallback's
        // substitution) fires the success listener, but success_all stays
        // false.
        let out = core.adjudicate(
            &exec,
            PolicyOutcome::from_error(crate::FaultError::Inner(TestError)),
            |_| {},
            |rejected| {
                let mut substitute = rejected;
                substitute.value = Some(9);
                substitute.error = None;
                substitute.success = true;
                substitute
            },
        );

        assert!(out.success);
        assert!(!out.success_all);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }
}
