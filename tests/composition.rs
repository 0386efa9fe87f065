//! Composition-order and outcome-propagation properties of the executor.

mod common;

use backstop::policy::{AttemptFn, Policy};
use backstop::{
    CircuitBreakerBuilder, Executor, FallbackBuilder, FaultError, RetryPolicyBuilder,
};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Probe policy recording when its layer is entered and exited.
struct Probe {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl<R, E> Policy<R, E> for Probe
where
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn apply(&self, _index: usize, inner: AttemptFn<R, E>) -> AttemptFn<R, E> {
        let name = self.name;
        let log = self.log.clone();
        Arc::new(move |exec| {
            let log = log.clone();
            let inner = inner.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("enter {}", name));
                let outcome = inner(exec).await;
                log.lock().unwrap().push(format!("exit {}", name));
                outcome
            })
        })
    }
}

#[tokio::test]
async fn layers_nest_outermost_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor: Executor<u32, StubError> = Executor::new()
        .with_policy(Probe { name: "outer", log: log.clone() })
        .with_policy(Probe { name: "middle", log: log.clone() })
        .with_policy(Probe { name: "inner", log: log.clone() });

    let result = executor.execute(|| async { Ok(1) }).await;
    assert_eq!(result.unwrap(), 1);

    let recorded = log.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![
            "enter outer",
            "enter middle",
            "enter inner",
            "exit inner",
            "exit middle",
            "exit outer",
        ]
    );
}

#[tokio::test]
async fn outer_layers_see_one_return_per_inner_retry_cycle() {
    // A probe outside the retry policy runs once; a probe inside it runs
    // once per attempt.
    let log = Arc::new(Mutex::new(Vec::new()));
    let retry = RetryPolicyBuilder::<u32, StubError>::new()
        .max_attempts(3)
        .expect("max_attempts > 0")
        .build();

    let executor = Executor::new()
        .with_policy(Probe { name: "outside", log: log.clone() })
        .with_policy(retry)
        .with_policy(Probe { name: "inside", log: log.clone() });

    let _ = executor
        .execute(error_n_times_then_return::<u32>(StubError::State, 10, vec![]))
        .await;

    let recorded = log.lock().unwrap().clone();
    let outside_entries = recorded.iter().filter(|l| l.contains("outside")).count();
    let inside_entries = recorded.iter().filter(|l| l.contains("inside")).count();
    assert_eq!(outside_entries, 2, "outer probe wraps the whole retry cycle");
    assert_eq!(inside_entries, 6, "inner probe runs on each of the 3 attempts");
}

#[tokio::test]
async fn success_all_stays_false_once_any_layer_rejects() {
    // The breaker rejects the result, an outer fallback substitutes a
    // success: the returned value is the substitute, but the executor still
    // dispatches its failure listener.
    let failures = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let (f, s) = (failures.clone(), successes.clone());

    let breaker = CircuitBreakerBuilder::<bool, StubError>::new()
        .handle_result(false)
        .delay(Duration::from_secs(60))
        .build();
    let fallback = FallbackBuilder::of(true).handle_result(false).build();

    let executor = Executor::new()
        .with_policy(fallback)
        .with_policy(breaker)
        .on_failure(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .on_success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

    let result = executor.execute(|| async { Ok(false) }).await;

    assert_eq!(result.unwrap(), true, "the fallback substitutes the handled result");
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn breaker_short_circuit_is_retried_as_a_handled_failure() {
    // With a positive delay the opened breaker rejects the remaining
    // attempts without running the operation.
    let retry = RetryPolicyBuilder::<u32, StubError>::new().max_retries(3).build();
    let breaker = CircuitBreakerBuilder::<u32, StubError>::new()
        .delay(Duration::from_secs(60))
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let count = calls.clone();
    let result = Executor::new()
        .with_policy(retry)
        .with_policy(breaker)
        .execute(move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(FaultError::Inner(StubError::State))
            }
        })
        .await;

    // First attempt opens the breaker; the other three are short-circuited.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.unwrap_err().is_circuit_open());
}

#[tokio::test]
async fn every_invocation_completes_exactly_once() {
    let completes = Arc::new(AtomicUsize::new(0));
    let terminal = Arc::new(AtomicUsize::new(0));
    let (c, t) = (completes.clone(), terminal.clone());

    let retry = RetryPolicyBuilder::<bool, StubError>::new().max_retries(2).build();
    let executor = Executor::new()
        .with_policy(retry)
        .on_complete(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .on_success({
            let t = t.clone();
            move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            }
        })
        .on_failure(move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        });

    for round in 0..4u32 {
        let succeed = round % 2 == 0;
        let _ = executor
            .execute(move || async move {
                if succeed {
                    Ok(true)
                } else {
                    Err(FaultError::Inner(StubError::State))
                }
            })
            .await;
    }

    assert_eq!(completes.load(Ordering::SeqCst), 4);
    // Exactly one of success/failure per invocation.
    assert_eq!(terminal.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn shared_breaker_state_spans_executors() {
    let breaker = CircuitBreakerBuilder::<u32, StubError>::new()
        .delay(Duration::from_secs(60))
        .build();

    let first = Executor::new().with_policy(breaker.clone());
    let second = Executor::new().with_policy(breaker.clone());

    let _ = first
        .execute(|| async { Err::<u32, _>(FaultError::Inner(StubError::State)) })
        .await;
    assert!(breaker.is_open());

    // A different executor over the same breaker is short-circuited.
    let calls = Arc::new(AtomicUsize::new(0));
    let count = calls.clone();
    let result = second
        .execute(move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        })
        .await;

    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
