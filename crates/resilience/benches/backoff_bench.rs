//! Benchmarks for backoff computation and breaker state reads.
//!
//! Run with: `cargo bench --bench backoff_bench -p marquee-resilience`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use marquee_resilience::{BackoffKind, CircuitBreaker, OperationContext, RetryPolicy};

fn bench_backoff_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_delay");

    let kinds = [
        ("fixed", BackoffKind::Fixed),
        ("linear", BackoffKind::Linear),
        ("exponential", BackoffKind::Exponential),
        ("fibonacci_approx", BackoffKind::FibonacciApprox),
    ];

    for (name, kind) in kinds {
        let policy = RetryPolicy::builder()
            .max_attempts(10)
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(30))
            .backoff(kind)
            .jitter_fraction(0.0)
            .build()
            .expect("valid bench policy");

        group.bench_with_input(BenchmarkId::from_parameter(name), &policy, |b, policy| {
            b.iter(|| {
                let mut previous = None;
                for attempt in 1..=8u32 {
                    let delay = policy.backoff_delay(black_box(attempt), previous);
                    previous = Some(delay);
                }
                black_box(previous)
            });
        });
    }

    group.finish();
}

fn bench_jitter(c: &mut Criterion) {
    let policy = RetryPolicy::builder()
        .jitter_fraction(0.3)
        .build()
        .expect("valid bench policy");
    let delay = Duration::from_millis(500);

    c.bench_function("jittered_delay", |b| {
        b.iter(|| black_box(policy.jittered(black_box(delay))));
    });
}

fn bench_breaker_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");
    let ctx = OperationContext::new("bench");

    group.bench_function("call_success", |b| {
        let breaker = CircuitBreaker::new("bench");
        b.iter(|| {
            let result = breaker.call(&ctx, || Ok::<_, std::io::Error>(()));
            black_box(result.is_ok())
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let breaker = CircuitBreaker::builder("bench")
            .failure_threshold(1)
            .recovery_timeout(Duration::from_secs(600))
            .build()
            .expect("valid bench breaker");
        breaker.record_failure();

        b.iter(|| {
            let result = breaker.call(&ctx, || Ok::<_, std::io::Error>(()));
            black_box(result.is_err())
        });
    });

    group.bench_function("state_read", |b| {
        let breaker = CircuitBreaker::new("bench");
        b.iter(|| black_box(breaker.state()));
    });

    group.finish();
}

criterion_group!(benches, bench_backoff_delay, bench_jitter, bench_breaker_paths);
criterion_main!(benches);
