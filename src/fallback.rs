//! Fallback policy.
//!
//! When a handled failure reaches this layer, the outcome is replaced by a
//! substitute: a fixed value, a fixed error, or the return of a user
//! function given the failed attempt. The substitute is classified by this
//! policy's own conditions to decide whether the fallback itself succeeded.
//! A substitution never resurrects `success_all`: outer listeners still see
//! the execution as failed overall.

use crate::events::{AttemptEvent, CompletedEvent};
use crate::execution::Execution;
use crate::outcome::PolicyOutcome;
use crate::policy::{AttemptFn, AttemptListener, Policy, PolicyCore};
use crate::FaultError;
use std::sync::Arc;

type SubstituteFn<R, E> =
    Arc<dyn Fn(AttemptEvent<R, E>) -> Result<R, FaultError<E>> + Send + Sync>;

enum Substitute<R, E> {
    Value(R),
    Error(FaultError<E>),
    Compute(SubstituteFn<R, E>),
}

impl<R: Clone, E: Clone> Clone for Substitute<R, E> {
    fn clone(&self) -> Self {
        match self {
            Substitute::Value(v) => Substitute::Value(v.clone()),
            Substitute::Error(e) => Substitute::Error(e.clone()),
            Substitute::Compute(f) => Substitute::Compute(f.clone()),
        }
    }
}

/// Fallback policy substituting handled failures with a replacement outcome.
pub struct Fallback<R, E> {
    core: PolicyCore<R, E>,
    substitute: Substitute<R, E>,
    on_failed_attempt: Option<AttemptListener<R, E>>,
}

impl<R: Clone, E: Clone> Clone for Fallback<R, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            substitute: self.substitute.clone(),
            on_failed_attempt: self.on_failed_attempt.clone(),
        }
    }
}

impl<R, E> std::fmt::Debug for Fallback<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.substitute {
            Substitute::Value(_) => "value",
            Substitute::Error(_) => "error",
            Substitute::Compute(_) => "function",
        };
        f.debug_struct("Fallback").field("substitute", &kind).finish()
    }
}

impl<R, E> Fallback<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    /// Substitute handled failures with `value`.
    pub fn of(value: R) -> Self {
        FallbackBuilder::of(value).build()
    }

    /// Substitute handled failures with the operation error `error`.
    pub fn of_error(error: E) -> Self {
        FallbackBuilder::of_error(error).build()
    }

    /// Substitute handled failures with the result of `f`, which receives
    /// the failed attempt.
    pub fn with_fn<F>(f: F) -> Self
    where
        F: Fn(AttemptEvent<R, E>) -> Result<R, FaultError<E>> + Send + Sync + 'static,
    {
        FallbackBuilder::with_fn(f).build()
    }

    fn apply_substitute(
        &self,
        exec: &Execution<R, E>,
        rejected: PolicyOutcome<R, E>,
    ) -> PolicyOutcome<R, E> {
        if let Some(listener) = &self.on_failed_attempt {
            listener(exec.attempt_event());
        }
        let (value, error) = match &self.substitute {
            Substitute::Value(v) => (Some(v.clone()), None),
            Substitute::Error(e) => (None, Some(e.clone())),
            Substitute::Compute(f) => match f(exec.attempt_event()) {
                Ok(v) => (Some(v), None),
                Err(e) => (None, Some(e)),
            },
        };
        let success = !self.core.classifier.is_failure(value.as_ref(), error.as_ref());
        PolicyOutcome {
            value,
            error,
            complete: true,
            success,
            // rejected.success_all is already false here; the substitution
            // does not undo inner layers' verdicts.
            success_all: success && rejected.success_all,
        }
    }
}

impl<R, E> Policy<R, E> for Fallback<R, E>
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
                let outcome = inner(exec.clone()).await;
                if exec.is_canceled() {
                    return exec.canceled_outcome().unwrap_or(outcome);
                }
                policy.core.adjudicate(
                    &exec,
                    outcome,
                    |_| {},
                    |rejected| policy.apply_substitute(&exec, rejected),
                )
            })
        })
    }
}

/// Builder for [`Fallback`].
pub struct FallbackBuilder<R, E> {
    policy: Fallback<R, E>,
}

impl<R, E> FallbackBuilder<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn of(value: R) -> Self {
        Self::with_substitute(Substitute::Value(value))
    }

    pub fn of_error(error: E) -> Self {
        Self::with_substitute(Substitute::Error(FaultError::Inner(error)))
    }

    pub fn with_fn<F>(f: F) -> Self
    where
        F: Fn(AttemptEvent<R, E>) -> Result<R, FaultError<E>> + Send + Sync + 'static,
    {
        Self::with_substitute(Substitute::Compute(Arc::new(f)))
    }

    fn with_substitute(substitute: Substitute<R, E>) -> Self {
        Self {
            policy: Fallback { core: PolicyCore::new(), substitute, on_failed_attempt: None },
        }
    }

    /// Substitute only operation errors matching `predicate`.
    pub fn handle_error_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_error_if(predicate);
        self
    }

    /// Substitute when the inner outcome is exactly `value`.
    pub fn handle_result(mut self, value: R) -> Self
    where
        R: PartialEq,
    {
        self.policy.core.classifier.handle_result(value);
        self
    }

    /// Substitute on results matching `predicate`.
    pub fn handle_result_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_result_if(predicate);
        self
    }

    /// Substitute on outcomes matching `predicate`.
    pub fn handle_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync + 'static,
    {
        self.policy.core.classifier.handle_if(predicate);
        self
    }

    /// Called when a handled failure reaches this policy, before the
    /// substitute is produced.
    pub fn on_failed_attempt<F>(mut self, listener: F) -> Self
    where
        F: Fn(AttemptEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.on_failed_attempt = Some(Arc::new(listener));
        self
    }

    /// Called when this policy's adjudicated outcome (substituted or passed
    /// through) is a success.
    pub fn on_success<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.core.on_success = Some(Arc::new(listener));
        self
    }

    /// Called when the adjudicated outcome is still a failure.
    pub fn on_failure<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.policy.core.on_failure = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Fallback<R, E> {
        self.policy
    }
}
