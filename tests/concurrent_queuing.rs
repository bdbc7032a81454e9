//! Concurrency stress tests for the shared engine handle
//!
//! These tests validate that joins, leaves and timers arriving from many
//! tasks at once leave the queue consistent.

mod fixtures;

use fixtures::stake;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wager_match::queue::{
    run_timer_dispatch, EngineHandle, MatchmakingEngine, QueueConfig, RecordingSink,
};
use wager_match::scheduler::{ManualScheduler, TokioScheduler};

fn shared_engine() -> EngineHandle {
    EngineHandle::new(MatchmakingEngine::new(
        QueueConfig {
            max_retries: 1_000,
            ..QueueConfig::default()
        },
        Arc::new(ManualScheduler::new()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_200_concurrent_joins_pair_everyone() {
    let engine = shared_engine();
    let concurrent_requests = 200;
    let start_time = Instant::now();

    let sinks: Vec<_> = (0..concurrent_requests)
        .map(|_| RecordingSink::new())
        .collect();

    let tasks: Vec<_> = sinks
        .iter()
        .enumerate()
        .map(|(i, sink)| {
            let engine = engine.clone();
            let sink = sink.clone();
            // Ten stake levels, twenty players each
            tokio::spawn(async move {
                engine.join(format!("load_player_{}", i), stake((i % 10) as i64 + 1), sink)
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.expect("join task panicked").expect("join failed");
    }

    let elapsed = start_time.elapsed();
    println!("200 concurrent joins processed in {:?}", elapsed);

    assert!(engine.snapshot().unwrap().is_empty());
    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_joins, 200);
    assert_eq!(stats.total_matches, 100);

    // Every player was matched exactly once, against someone at its stake
    let mut opponents = HashSet::new();
    for (i, sink) in sinks.iter().enumerate() {
        assert_eq!(sink.count("match_found"), 1, "player {} not matched once", i);
        match sink.last() {
            Some(wager_match::queue::Outcome::MatchFound {
                opponent,
                bet_amount,
            }) => {
                assert_eq!(bet_amount, stake((i % 10) as i64 + 1));
                assert!(opponents.insert(opponent));
            }
            other => panic!("expected match for player {}, got {:?}", i, other),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_join_and_leave_keep_queue_unique() {
    let engine = shared_engine();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let player_id = format!("churn_player_{}", i % 20);
                // Distinct stakes keep everyone queued
                engine.join(player_id.clone(), stake(1_000 + i % 20), RecordingSink::new())?;
                if i % 3 == 0 {
                    engine.leave(&player_id)?;
                }
                anyhow::Ok(())
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.expect("task panicked").expect("engine call failed");
    }

    let queue = engine.snapshot().unwrap();
    let unique: HashSet<_> = queue.iter().map(|entry| entry.player_id.clone()).collect();
    assert_eq!(unique.len(), queue.len());
    assert!(queue.len() <= 20);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_under_load_fire_once_per_player() {
    let (scheduler, timer_events) = TokioScheduler::new();
    let engine = EngineHandle::new(MatchmakingEngine::new(
        QueueConfig {
            match_timeout: Duration::from_secs(30),
            max_retries: 1_000,
            cooldown: Duration::from_secs(60),
        },
        Arc::new(scheduler),
    ));
    let dispatch = tokio::spawn(run_timer_dispatch(engine.clone(), timer_events));

    let sinks: Vec<_> = (0..50)
        .map(|i| {
            let sink = RecordingSink::new();
            engine
                .join(format!("idle_player_{}", i), stake(i + 1), sink.clone())
                .unwrap();
            sink
        })
        .collect();
    assert_eq!(engine.snapshot().unwrap().len(), 50);

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert!(engine.snapshot().unwrap().is_empty());
    for sink in &sinks {
        assert_eq!(sink.count("match_timeout"), 1);
    }
    assert_eq!(engine.stats().unwrap().total_timeouts, 50);

    dispatch.abort();
}
