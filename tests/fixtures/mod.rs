//! Test fixtures shared by the integration and load tests
#![allow(dead_code)]

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wager_match::queue::{JoinStatus, MatchmakingEngine, QueueConfig, RecordingSink};
use wager_match::scheduler::ManualScheduler;
use wager_match::types::{PlayerId, Stake};

/// Engine driven by a manual clock, with one recording sink per player
pub struct TestEngine {
    pub engine: MatchmakingEngine,
    pub scheduler: ManualScheduler,
    sinks: HashMap<PlayerId, Arc<RecordingSink>>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let scheduler = ManualScheduler::new();
        let engine = MatchmakingEngine::new(config, Arc::new(scheduler.clone()));
        Self {
            engine,
            scheduler,
            sinks: HashMap::new(),
        }
    }

    /// Join `player_id`, reusing its sink across rejoins
    pub fn join(&mut self, player_id: &str, stake: Stake) -> JoinStatus {
        let sink = self.sink(player_id);
        self.engine.join(player_id.to_string(), stake, sink)
    }

    pub fn leave(&mut self, player_id: &str) -> bool {
        self.engine.leave(player_id)
    }

    /// Recording sink of `player_id`, created on first use
    pub fn sink(&mut self, player_id: &str) -> Arc<RecordingSink> {
        self.sinks
            .entry(player_id.to_string())
            .or_insert_with(RecordingSink::new)
            .clone()
    }

    /// Advance the clock and apply every timer that came due.
    /// Returns how many fired timers the engine acted on.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.scheduler
            .advance(by)
            .into_iter()
            .filter(|event| self.engine.handle_timer(event.clone()))
            .count()
    }

    /// Queued player ids in queue order
    pub fn queued_ids(&self) -> Vec<PlayerId> {
        self.engine
            .snapshot()
            .into_iter()
            .map(|entry| entry.player_id)
            .collect()
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stake(amount: i64) -> Stake {
    Decimal::from(amount)
}
