//! Admission hot-path benchmarks
//!
//! Benchmarks for the token bucket, per-session limiter and circuit breaker
//! checks that run before every outbound call.
//!
//! Run with: `cargo bench --bench resilience_bench -p hearth-common
//! --features runtime`

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hearth_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, MockClock, PerSessionLimiter, TokenBucket,
    TokenBucketConfig,
};

// ============================================================================
// Token Bucket Benchmarks
// ============================================================================

fn bench_token_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");

    group.bench_function("acquire_granted", |b| {
        let bucket = TokenBucket::new(TokenBucketConfig::new(u32::MAX / 2, 2.0))
            .expect("valid bucket config for benchmarks");
        b.iter(|| black_box(bucket.acquire(1)));
    });

    group.bench_function("acquire_rejected", |b| {
        let clock = MockClock::new();
        let bucket = TokenBucket::with_clock(TokenBucketConfig::new(1, 1.0), clock.shared())
            .expect("valid bucket config for benchmarks");
        bucket.acquire(1);
        b.iter(|| black_box(bucket.acquire(1)));
    });

    group.bench_function("status_snapshot", |b| {
        let bucket = TokenBucket::new(TokenBucketConfig::new(600, 1.5))
            .expect("valid bucket config for benchmarks");
        b.iter(|| black_box(bucket.status()));
    });

    group.finish();
}

// ============================================================================
// Per-Session Limiter Benchmarks
// ============================================================================

fn bench_session_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_limiter");

    for sessions in [1usize, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("acquire_existing", sessions),
            &sessions,
            |b, &sessions| {
                let limiter = PerSessionLimiter::new(
                    TokenBucketConfig::new(u32::MAX / 2, 1.0),
                    Duration::from_secs(3600),
                )
                .expect("valid limiter config for benchmarks");
                let ids: Vec<String> = (0..sessions).map(|i| format!("session-{i}")).collect();
                for id in &ids {
                    limiter.acquire(id, 1);
                }

                let mut next = 0usize;
                b.iter(|| {
                    next = (next + 1) % ids.len();
                    black_box(limiter.acquire(&ids[next], 1))
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("closed_admit_and_record", |b| {
        let breaker = CircuitBreaker::with_defaults("weather");
        b.iter(|| {
            if breaker.can_execute() {
                breaker.record_success();
            }
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .cooldown(Duration::from_secs(3600))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new("news", config)
            .expect("circuit breaker should build for short-circuit");

        // Trip the breaker so it remains open for the benchmark iterations.
        breaker.record_failure();

        b.iter(|| black_box(breaker.can_execute()));
    });

    group.bench_function("contended_threads", |b| {
        let breaker = Arc::new(CircuitBreaker::with_defaults("stocks"));
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let breaker = Arc::clone(&breaker);
                    std::thread::spawn(move || {
                        for _ in 0..64 {
                            if breaker.can_execute() {
                                breaker.record_success();
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_token_bucket, bench_session_limiter, bench_circuit_breaker);
criterion_main!(benches);
