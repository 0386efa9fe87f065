//! Failure classification shared by every policy.
//!
//! Each policy owns an independent classifier, so an error that counts as a
//! failure for the retry policy need not count as one for the breaker.

use crate::FaultError;
use std::sync::Arc;

type ErrorMatcher<E> = Arc<dyn Fn(&FaultError<E>) -> bool + Send + Sync>;
type ResultMatcher<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;
type OutcomePredicate<R, E> =
    Arc<dyn Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync>;

/// A disjunction of failure conditions over a `(value, error)` pair.
///
/// With no conditions configured, an outcome is a failure iff it carries an
/// error. Configuring error-examining conditions narrows which errors count;
/// configuring only result conditions leaves every error a failure, since no
/// condition examined it.
pub struct FailureClassifier<R, E> {
    error_matchers: Vec<ErrorMatcher<E>>,
    result_matchers: Vec<ResultMatcher<R>>,
    predicates: Vec<OutcomePredicate<R, E>>,
    errors_checked: bool,
}

impl<R, E> Clone for FailureClassifier<R, E> {
    fn clone(&self) -> Self {
        Self {
            error_matchers: self.error_matchers.clone(),
            result_matchers: self.result_matchers.clone(),
            predicates: self.predicates.clone(),
            errors_checked: self.errors_checked,
        }
    }
}

impl<R, E> std::fmt::Debug for FailureClassifier<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifier")
            .field("error_matchers", &self.error_matchers.len())
            .field("result_matchers", &self.result_matchers.len())
            .field("predicates", &self.predicates.len())
            .field("errors_checked", &self.errors_checked)
            .finish()
    }
}

impl<R, E> Default for FailureClassifier<R, E>
where
    R: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> FailureClassifier<R, E>
where
    R: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            error_matchers: Vec::new(),
            result_matchers: Vec::new(),
            predicates: Vec::new(),
            errors_checked: false,
        }
    }

    /// Treat operation errors matching `predicate` as failures.
    pub fn handle_error_if<F>(&mut self, predicate: F)
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.errors_checked = true;
        self.error_matchers
            .push(Arc::new(move |err| err.as_inner().is_some_and(&predicate)));
    }

    /// Treat any error produced by the layers themselves (breaker rejection,
    /// cancellation) matching `predicate` as a failure.
    pub fn handle_fault_if<F>(&mut self, predicate: F)
    where
        F: Fn(&FaultError<E>) -> bool + Send + Sync + 'static,
    {
        self.errors_checked = true;
        self.error_matchers.push(Arc::new(predicate));
    }

    /// Treat the exact result `value` as a failure.
    pub fn handle_result(&mut self, value: R)
    where
        R: PartialEq,
    {
        self.result_matchers.push(Arc::new(move |r| *r == value));
    }

    /// Treat results matching `predicate` as failures.
    pub fn handle_result_if<F>(&mut self, predicate: F)
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.result_matchers.push(Arc::new(predicate));
    }

    /// Treat outcomes matching `predicate` as failures. The predicate sees
    /// the whole `(value, error)` pair.
    pub fn handle_if<F>(&mut self, predicate: F)
    where
        F: Fn(Option<&R>, Option<&FaultError<E>>) -> bool + Send + Sync + 'static,
    {
        self.errors_checked = true;
        self.predicates.push(Arc::new(predicate));
    }

    pub fn is_empty(&self) -> bool {
        self.error_matchers.is_empty()
            && self.result_matchers.is_empty()
            && self.predicates.is_empty()
    }

    /// Decide whether `(value, error)` is a failure for the owning policy.
    pub fn is_failure(&self, value: Option<&R>, error: Option<&FaultError<E>>) -> bool {
        if self.is_empty() {
            return error.is_some();
        }
        if self.predicates.iter().any(|p| p(value, error)) {
            return true;
        }
        if let Some(err) = error {
            if self.error_matchers.iter().any(|m| m(err)) {
                return true;
            }
            // An error that no error-examining condition looked at is still
            // a failure.
            if !self.errors_checked {
                return true;
            }
        }
        if let Some(v) = value {
            if self.result_matchers.iter().any(|m| m(v)) {
                return true;
            }
        }
        false
    }

    /// Strict match: true only when a configured condition matches. An empty
    /// classifier matches nothing. Used for abort conditions, which default
    /// to "never".
    pub fn matches(&self, value: Option<&R>, error: Option<&FaultError<E>>) -> bool {
        if self.predicates.iter().any(|p| p(value, error)) {
            return true;
        }
        if let Some(err) = error {
            if self.error_matchers.iter().any(|m| m(err)) {
                return true;
            }
        }
        if let Some(v) = value {
            if self.result_matchers.iter().any(|m| m(v)) {
                return true;
            }
        }
        false
    }
}
