//! The result envelope passed between policy layers.

use crate::FaultError;

/// Outcome of an attempt as seen by a policy layer.
///
/// The terminal function (the user's operation) produces an outcome with all
/// flags set; each policy layer then adjudicates it on the way out. `success`
/// reflects the most recent layer's verdict, while `success_all` is the AND
/// of every layer's verdict so far: once false it stays false as the outcome
/// bubbles outward.
///
/// Invariant: when `error` is present, `value` is `None`.
#[derive(Debug, Clone)]
pub struct PolicyOutcome<R, E> {
    /// Produced value, when the outcome carries one.
    pub value: Option<R>,
    /// Failure carried by this outcome, if any.
    pub error: Option<FaultError<E>>,
    /// A policy decided no further inner attempts should run.
    pub complete: bool,
    /// The most recent adjudicating layer accepted this outcome.
    pub success: bool,
    /// Every adjudicating layer so far accepted this outcome.
    pub success_all: bool,
}

impl<R, E> PolicyOutcome<R, E> {
    /// Terminal outcome for a value the operation returned.
    pub fn from_value(value: R) -> Self {
        Self { value: Some(value), error: None, complete: true, success: true, success_all: true }
    }

    /// Terminal outcome for an error the operation returned.
    pub fn from_error(error: FaultError<E>) -> Self {
        Self { value: None, error: Some(error), complete: true, success: true, success_all: true }
    }

    /// Outcome produced by a layer without invoking the inner function, e.g.
    /// a breaker rejection or a cancellation record.
    pub fn short_circuit(error: FaultError<E>) -> Self {
        Self { value: None, error: Some(error), complete: true, success: false, success_all: false }
    }

    /// Mark this outcome accepted by the current layer. `success_all` is
    /// left as-is: a later acceptance cannot undo an inner rejection.
    pub fn with_success(mut self) -> Self {
        self.success = true;
        self.complete = true;
        self
    }

    /// Mark this outcome rejected by the current layer.
    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self.success_all = false;
        self
    }

    /// True when this outcome carries a failure per the invariant (an error
    /// is present).
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
