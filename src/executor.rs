//! Executor: composes policies around an operation and drives one execution.
//!
//! Policies are listed outermost-first; at execution time they are folded
//! right-to-left around a terminal function that runs the operation and
//! records its outcome, producing `P0(P1(...Pn(operation)...))`. The
//! executor owns completion dispatch: `on_success` when every layer accepted
//! the final outcome, `on_failure` otherwise, and `on_complete` always,
//! last, exactly once.
//!
//! A panic in the operation or in any listener unwinds through the executor
//! untouched: remaining listeners are skipped and the panic surfaces to the
//! caller (or to [`ExecutionHandle::wait`] for spawned executions).

use crate::error::CancelSource;
use crate::events::CompletedEvent;
use crate::execution::{CancelSignal, Cancellation, Execution, SIGNAL_CANCEL_INDEX};
use crate::outcome::PolicyOutcome;
use crate::policy::{AttemptFn, CompletionListener, Policy};
use crate::FaultError;
use std::future::Future;
use std::sync::Arc;

/// Aborts the cancellation watcher even when the execution panics.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Executes operations through an ordered stack of fault-handling policies.
///
/// Logically immutable once built: configuration methods consume and return
/// the executor, and `with_signal` yields a shallow copy sharing the same
/// policies (and therefore any shared policy state, like a breaker's).
pub struct Executor<R, E> {
    policies: Vec<Arc<dyn Policy<R, E>>>,
    signal: Option<CancelSignal>,
    on_complete: Option<CompletionListener<R, E>>,
    on_success: Option<CompletionListener<R, E>>,
    on_failure: Option<CompletionListener<R, E>>,
}

impl<R, E> Clone for Executor<R, E> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            signal: self.signal.clone(),
            on_complete: self.on_complete.clone(),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<R, E> std::fmt::Debug for Executor<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("policies", &self.policies.len())
            .field("has_signal", &self.signal.is_some())
            .finish()
    }
}

impl<R, E> Default for Executor<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> Executor<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    /// Executor with no policies; the operation runs exactly once.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            signal: None,
            on_complete: None,
            on_success: None,
            on_failure: None,
        }
    }

    /// Executor over an ordered policy stack, outermost first.
    pub fn of(policies: impl IntoIterator<Item = Arc<dyn Policy<R, E>>>) -> Self {
        let mut executor = Self::new();
        executor.policies = policies.into_iter().collect();
        executor
    }

    /// Append a policy inside the current stack (the first added policy is
    /// outermost).
    pub fn with_policy<P>(mut self, policy: P) -> Self
    where
        P: Policy<R, E> + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Shallow copy with the cancellation signal replaced. Executions run
    /// from the result are canceled when the signal fires.
    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Called when the execution completes and every policy accepted the
    /// final outcome.
    pub fn on_success<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(listener));
        self
    }

    /// Called when the execution completes and some policy rejected the
    /// final outcome.
    pub fn on_failure<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(listener));
        self
    }

    /// Called exactly once per execution, after `on_success`/`on_failure`.
    pub fn on_complete<F>(mut self, listener: F) -> Self
    where
        F: Fn(CompletedEvent<R, E>) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(listener));
        self
    }

    /// Run `op` through the policy stack on the current task.
    pub async fn execute<Op, Fut>(&self, op: Op) -> Result<R, FaultError<E>>
    where
        Op: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
    {
        self.execute_with(move |_exec| op()).await
    }

    /// Run `op` through the policy stack, handing it the [`Execution`] so it
    /// can observe attempt state and cooperate with cancellation.
    pub async fn execute_with<Op, Fut>(&self, op: Op) -> Result<R, FaultError<E>>
    where
        Op: Fn(Execution<R, E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
    {
        self.run(op, None).await
    }

    /// Run `op` on a dedicated tokio task, returning a handle that supports
    /// waiting, polling, and cooperative cancellation.
    pub fn spawn<Op, Fut>(&self, op: Op) -> ExecutionHandle<R, E>
    where
        Op: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
    {
        self.spawn_with(move |_exec| op())
    }

    /// Execution-aware variant of [`Executor::spawn`].
    pub fn spawn_with<Op, Fut>(&self, op: Op) -> ExecutionHandle<R, E>
    where
        Op: Fn(Execution<R, E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
    {
        let cancellation = Cancellation::new();
        let signal = cancellation.signal();
        let executor = self.clone();
        let task = tokio::spawn(async move { executor.run(op, Some(signal)).await });
        ExecutionHandle { task, cancellation }
    }

    async fn run<Op, Fut>(
        &self,
        op: Op,
        extra_signal: Option<CancelSignal>,
    ) -> Result<R, FaultError<E>>
    where
        Op: Fn(Execution<R, E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
    {
        let op = Arc::new(op);
        let terminal: AttemptFn<R, E> = Arc::new(move |exec: Execution<R, E>| {
            let op = op.clone();
            Box::pin(async move {
                if let Some(out) = exec.canceled_outcome() {
                    return out;
                }
                let outcome = match op(exec.clone()).await {
                    Ok(value) => PolicyOutcome::from_value(value),
                    Err(error) => PolicyOutcome::from_error(error),
                };
                exec.record(outcome)
            })
        });

        // Fold policies right-to-left: the innermost policy gets layer
        // index 0 and wraps the terminal first.
        let mut composed = terminal;
        for (index, policy) in self.policies.iter().rev().enumerate() {
            composed = policy.apply(index, composed);
        }

        let exec: Execution<R, E> = Execution::new();

        // Forward external signals into the execution's cancellation record
        // at the sentinel outermost index. The watcher is aborted on every
        // exit path, including panics.
        let mut watchers = Vec::new();
        let signals =
            self.signal.iter().cloned().chain(extra_signal).collect::<Vec<_>>();
        // A signal that already fired must take effect before the first
        // attempt, not whenever the watcher task gets scheduled.
        if signals.iter().any(|signal| signal.is_canceled()) {
            exec.cancel(
                SIGNAL_CANCEL_INDEX,
                PolicyOutcome::short_circuit(FaultError::Canceled {
                    source: CancelSource::Signal,
                }),
            );
        }
        for signal in signals {
            let target = exec.clone();
            let mut rx = signal.rx;
            watchers.push(AbortOnDrop(tokio::spawn(async move {
                if rx.wait_for(|canceled| *canceled).await.is_ok() {
                    target.cancel(
                        SIGNAL_CANCEL_INDEX,
                        PolicyOutcome::short_circuit(FaultError::Canceled {
                            source: CancelSource::Signal,
                        }),
                    );
                }
            })));
        }

        exec.initialize_attempt();
        let outcome = composed(exec.clone()).await;
        drop(watchers);

        if outcome.success_all {
            if let Some(listener) = &self.on_success {
                listener(exec.completed_event(&outcome));
            }
        } else if let Some(listener) = &self.on_failure {
            listener(exec.completed_event(&outcome));
        }
        if let Some(listener) = &self.on_complete {
            listener(exec.completed_event(&outcome));
        }

        match (outcome.value, outcome.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => unreachable!("outcome carried neither value nor error"),
        }
    }
}

/// Handle onto an execution running on its own task.
pub struct ExecutionHandle<R, E> {
    task: tokio::task::JoinHandle<Result<R, FaultError<E>>>,
    cancellation: Cancellation,
}

impl<R, E> std::fmt::Debug for ExecutionHandle<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle").field("done", &self.is_done()).finish()
    }
}

impl<R, E> ExecutionHandle<R, E> {
    /// Wait for the execution to finish. A panic inside the execution is
    /// resumed here.
    pub async fn wait(self) -> Result<R, FaultError<E>> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(FaultError::Canceled { source: CancelSource::Signal }),
        }
    }

    /// Whether the execution has finished.
    pub fn is_done(&self) -> bool {
        self.task.is_finished()
    }

    /// Cooperatively cancel the execution: no further attempts start,
    /// pending delays wake, and the result becomes a cancellation error.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// One-shot convenience: execute `op` through `policies` (outermost first).
pub async fn execute<R, E, Op, Fut>(
    op: Op,
    policies: impl IntoIterator<Item = Arc<dyn Policy<R, E>>>,
) -> Result<R, FaultError<E>>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
    Op: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
{
    Executor::of(policies).execute(op).await
}

/// One-shot convenience: spawn `op` through `policies` on its own task.
pub fn spawn<R, E, Op, Fut>(
    op: Op,
    policies: impl IntoIterator<Item = Arc<dyn Policy<R, E>>>,
) -> ExecutionHandle<R, E>
where
    R: Clone + Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
    Op: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, FaultError<E>>> + Send + 'static,
{
    Executor::of(policies).spawn(op)
}
