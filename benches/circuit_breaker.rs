use backstop::{CircuitBreakerBuilder, Executor, FaultError};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct BenchError;

impl std::fmt::Display for BenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bench error")
    }
}

impl std::error::Error for BenchError {}

fn breaker_closed_success_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreakerBuilder::<u64, BenchError>::new()
        .failure_threshold(10)
        .unwrap()
        .delay(Duration::from_secs(30))
        .build();
    let executor = Executor::new().with_policy(breaker);

    c.bench_function("breaker_closed_success", |b| {
        b.to_async(&rt).iter(|| {
            let executor = executor.clone();
            async move {
                let _ = black_box(executor.execute(|| async { Ok(black_box(1u64)) }).await);
            }
        });
    });
}

fn breaker_open_short_circuit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreakerBuilder::<u64, BenchError>::new()
        .delay(Duration::from_secs(3600))
        .build();
    breaker.open();
    let executor = Executor::new().with_policy(breaker);

    c.bench_function("breaker_open_short_circuit", |b| {
        b.to_async(&rt).iter(|| {
            let executor = executor.clone();
            async move {
                let result: Result<u64, FaultError<BenchError>> =
                    executor.execute(|| async { Ok(1u64) }).await;
                let _ = black_box(result);
            }
        });
    });
}

criterion_group!(benches, breaker_closed_success_path, breaker_open_short_circuit);
criterion_main!(benches);
