//! Performance benchmarks for the matching pass

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wager_match::queue::{
    Candidate, ExactStakeMatcher, MatchmakingEngine, PairingStrategy, QueueConfig, RecordingSink,
};
use wager_match::scheduler::ManualScheduler;

fn create_bench_engine() -> MatchmakingEngine {
    MatchmakingEngine::new(
        QueueConfig {
            max_retries: u32::MAX,
            ..QueueConfig::default()
        },
        Arc::new(ManualScheduler::new()),
    )
}

/// Candidates with every stake distinct except the last `pairs` pairs
fn candidates(size: usize, pairs: usize) -> Vec<Candidate> {
    let origin = Instant::now();
    (0..size)
        .map(|i| {
            let level = if i >= size - pairs * 2 {
                (i / 2) as i64
            } else {
                i as i64 + size as i64
            };
            Candidate {
                player_id: format!("player_{}", i),
                stake: Decimal::new(level * 25, 2),
                enqueued_at: origin + Duration::from_millis(i as u64),
            }
        })
        .collect()
}

fn bench_pairing_plan(c: &mut Criterion) {
    let matcher = ExactStakeMatcher::new();
    let mut group = c.benchmark_group("pairing_plan");

    for size in [10usize, 100, 1_000] {
        let input = candidates(size, size / 10);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(matcher.plan(input)))
        });
    }

    group.finish();
}

fn bench_join_into_waiting_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_into_waiting_queue");

    for waiting in [10usize, 100, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(waiting),
            &waiting,
            |b, &waiting| {
                b.iter_with_setup(
                    || {
                        let mut engine = create_bench_engine();
                        for i in 0..waiting {
                            engine.join(
                                format!("waiting_{}", i),
                                Decimal::from(i as i64 + 1),
                                RecordingSink::new(),
                            );
                        }
                        engine
                    },
                    |mut engine| {
                        // Pairs with the oldest waiting player
                        black_box(engine.join(
                            "bench_player".to_string(),
                            Decimal::from(1),
                            RecordingSink::new(),
                        ))
                    },
                )
            },
        );
    }

    group.finish();
}

fn bench_engine_stats(c: &mut Criterion) {
    let mut engine = create_bench_engine();
    for i in 0..500 {
        engine.join(
            format!("player_{}", i),
            Decimal::from(i as i64),
            RecordingSink::new(),
        );
    }

    c.bench_function("engine_stats", |b| b.iter(|| black_box(engine.stats())));
}

criterion_group!(
    benches,
    bench_pairing_plan,
    bench_join_into_waiting_queue,
    bench_engine_stats
);
criterion_main!(benches);
