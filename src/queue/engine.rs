//! Matchmaking engine
//!
//! The single owner of all queue state. Every operation runs to completion
//! synchronously; the only deferred work is timers, which come back in through
//! [`MatchmakingEngine::handle_timer`].

use crate::metrics::MetricsCollector;
use crate::queue::matching::{ExactStakeMatcher, Pairing, PairingStrategy};
use crate::queue::outcome::{Outcome, ReplyHandle};
use crate::queue::registry::{Candidate, UpsertResult};
use crate::queue::table::PlayerTable;
use crate::scheduler::{Scheduler, TimerEvent, TimerKind};
use crate::storage::QueueStore;
use crate::types::{
    CooldownApplied, MatchEvent, MatchFound, PlayerId, PlayerState, PlayerStatus, QueueEntry,
    Stake,
};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Timing and retry policy for the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long a player may wait before being dropped from the queue
    pub match_timeout: Duration,
    /// Unmatched passes allowed at one stake before cooldown
    pub max_retries: u32,
    /// How long a player is barred from rejoining after exhausting retries
    pub cooldown: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(30),
            max_retries: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// What a join request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Player entered the queue
    Joined,
    /// Player was already queued; stake, handle and position were refreshed
    Updated,
    /// Player is on cooldown; nothing changed
    RejectedOnCooldown,
}

/// Summary of one matching pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub matches: usize,
    pub retry_misses: usize,
    pub cooldowns_applied: usize,
}

/// Engine counters and current sizes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub players_waiting: usize,
    pub players_on_cooldown: usize,
    pub total_joins: u64,
    pub total_leaves: u64,
    pub total_matches: u64,
    pub total_retry_misses: u64,
    pub total_cooldowns: u64,
    pub total_timeouts: u64,
    pub total_passes: u64,
}

/// Stake-based matchmaking engine
pub struct MatchmakingEngine {
    config: QueueConfig,
    table: PlayerTable,
    matcher: Box<dyn PairingStrategy>,
    store: Option<Arc<dyn QueueStore>>,
    metrics: Option<Arc<MetricsCollector>>,
    events: Option<mpsc::UnboundedSender<MatchEvent>>,
    stats: EngineStats,
}

impl MatchmakingEngine {
    /// Create an engine with the exact-stake matcher and no collaborators
    pub fn new(config: QueueConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            config,
            table: PlayerTable::new(scheduler),
            matcher: Box::new(ExactStakeMatcher::new()),
            store: None,
            metrics: None,
            events: None,
            stats: EngineStats::default(),
        }
    }

    /// Mirror queue state into `store`
    pub fn with_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record Prometheus metrics through `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Emit match and cooldown events on `events`
    pub fn with_event_sink(mut self, events: mpsc::UnboundedSender<MatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add `player_id` to the queue at `stake`, or refresh its entry if already queued.
    ///
    /// A player on cooldown is told so and left out of the queue. Otherwise the
    /// match timer is (re)armed, retry progress is reset, the player receives
    /// `queue_joined` or `queue_update`, and one matching pass runs.
    pub fn join(&mut self, player_id: PlayerId, stake: Stake, handle: ReplyHandle) -> JoinStatus {
        if self.table.is_on_cooldown(&player_id) {
            let retries = self.table.retry_count(&player_id);
            let remaining = self
                .table
                .cooldown_remaining(&player_id)
                .unwrap_or(self.config.cooldown);

            info!(
                "Player '{}' tried to join while on cooldown - retries: {}, remaining: {}s",
                player_id,
                retries,
                remaining.as_secs()
            );
            handle.deliver(Outcome::cooldown_active(retries, remaining));
            if let Some(metrics) = &self.metrics {
                metrics.record_join("rejected_cooldown");
            }
            return JoinStatus::RejectedOnCooldown;
        }

        let now = self.table.now();
        let upsert = self.table.upsert(&player_id, stake, handle.clone(), now);
        self.table.arm_match_timer(&player_id, self.config.match_timeout);
        self.table.reset(&player_id);
        self.stats.total_joins += 1;

        self.mirror("upsert_queue_entry", |store| {
            store.upsert_queue_entry(&player_id, stake)
        });

        let retries = self.table.retry_count(&player_id);
        let status = match upsert {
            UpsertResult::Inserted => {
                info!("Player '{}' joined queue with stake {}", player_id, stake);
                handle.deliver(Outcome::queue_joined(retries));
                JoinStatus::Joined
            }
            UpsertResult::Refreshed => {
                info!("Player '{}' re-added to queue with stake {}", player_id, stake);
                handle.deliver(Outcome::queue_update(retries));
                JoinStatus::Updated
            }
            UpsertResult::StakeChanged { previous } => {
                info!(
                    "Player '{}' changed stake from {} to {}",
                    player_id, previous, stake
                );
                handle.deliver(Outcome::queue_update(retries));
                JoinStatus::Updated
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_join(match status {
                JoinStatus::Joined => "joined",
                _ => "updated",
            });
        }

        self.run_matching_pass();
        status
    }

    /// Remove `player_id` from the queue. Returns `false` if it was not queued.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let Some(removed) = self.table.remove(player_id) else {
            debug!("Leave for player '{}' ignored, not queued", player_id);
            return false;
        };
        self.table.reset(player_id);
        self.stats.total_leaves += 1;

        info!(
            "Player '{}' left queue after {:.1}s",
            player_id,
            self.waited(removed.enqueued_at).as_secs_f64()
        );

        self.mirror("delete_entries", |store| {
            store.delete_entries(&[player_id.to_string()])
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_leave();
        }
        true
    }

    /// Apply a fired timer. Returns `false` if the event was stale.
    pub fn handle_timer(&mut self, event: TimerEvent) -> bool {
        match event.kind {
            TimerKind::MatchTimeout => self.expire_match_timer(event),
            TimerKind::CooldownExpiry => self.expire_cooldown(event),
        }
    }

    fn expire_match_timer(&mut self, event: TimerEvent) -> bool {
        if self.table.match_timer_token(&event.player_id) != Some(event.token) {
            debug!(
                "Ignoring stale match timer for player '{}' (token {})",
                event.player_id, event.token
            );
            return false;
        }
        let Some(removed) = self.table.remove(&event.player_id) else {
            return false;
        };

        let waited = self.waited(removed.enqueued_at);
        info!(
            "Player '{}' timed out after {:.1}s without a match",
            event.player_id,
            waited.as_secs_f64()
        );
        removed.handle.deliver(Outcome::match_timeout());
        self.stats.total_timeouts += 1;

        self.mirror("delete_entries", |store| {
            store.delete_entries(&[event.player_id.clone()])
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_timeout(waited);
        }
        true
    }

    fn expire_cooldown(&mut self, event: TimerEvent) -> bool {
        if !self.table.clear_cooldown(&event.player_id, event.token) {
            debug!(
                "Ignoring stale cooldown timer for player '{}' (token {})",
                event.player_id, event.token
            );
            return false;
        }

        // Absent again, so the spent retry count goes and the record is pruned
        info!("Player '{}' cooldown expired", event.player_id);
        self.table.reset(&event.player_id);
        self.mirror("update_retry_or_cooldown", |store| {
            store.update_retry_or_cooldown(&event.player_id, 0, None)
        });
        true
    }

    /// Run one matching pass over the whole queue.
    ///
    /// Pairs are notified and removed first; every player still queued
    /// afterwards counts one retry-miss, and players that exhaust their
    /// retries move to cooldown.
    pub fn run_matching_pass(&mut self) -> PassSummary {
        let started = Instant::now();
        let candidates = self.table.candidates();
        let mut summary = PassSummary::default();
        if candidates.is_empty() {
            return summary;
        }

        let plan = self.matcher.plan(&candidates);
        debug!(
            "Matching pass over {} players - {} pairings, {} unmatched",
            candidates.len(),
            plan.pairings.len(),
            plan.unmatched.len()
        );

        for pairing in plan.pairings {
            if self.complete_match(pairing) {
                summary.matches += 1;
            }
        }

        for candidate in plan.unmatched {
            if let Some(cooled_down) = self.record_miss(candidate) {
                summary.retry_misses += 1;
                if cooled_down {
                    summary.cooldowns_applied += 1;
                }
            }
        }

        self.stats.total_passes += 1;
        self.stats.total_matches += summary.matches as u64;
        self.stats.total_retry_misses += summary.retry_misses as u64;
        self.stats.total_cooldowns += summary.cooldowns_applied as u64;

        if let Some(metrics) = &self.metrics {
            metrics.record_matching_pass(started.elapsed());
            metrics.set_players_waiting(self.table.queued_count());
        }
        summary
    }

    fn complete_match(&mut self, pairing: Pairing) -> bool {
        let first = self.table.remove(&pairing.first);
        let second = self.table.remove(&pairing.second);
        let (Some(first), Some(second)) = (first, second) else {
            warn!(
                "Pairing {} vs {} no longer queued, skipping",
                pairing.first, pairing.second
            );
            return false;
        };

        first
            .handle
            .deliver(Outcome::match_found(pairing.second.clone(), pairing.stake));
        second
            .handle
            .deliver(Outcome::match_found(pairing.first.clone(), pairing.stake));
        self.table.reset(&pairing.first);
        self.table.reset(&pairing.second);

        info!(
            "Match found: {} vs {} at stake {}",
            pairing.first, pairing.second, pairing.stake
        );

        let players = [pairing.first.clone(), pairing.second.clone()];
        self.mirror("delete_entries", |store| store.delete_entries(&players));

        if let Some(metrics) = &self.metrics {
            metrics.record_match(&[
                self.waited(first.enqueued_at),
                self.waited(second.enqueued_at),
            ]);
        }

        self.emit(MatchEvent::MatchFound(MatchFound {
            match_id: utils::generate_match_id(),
            players,
            stake: pairing.stake,
            timestamp: utils::current_timestamp(),
        }));
        true
    }

    /// Returns whether the miss put the player on cooldown, or `None` if the
    /// candidate is no longer queued.
    fn record_miss(&mut self, candidate: Candidate) -> Option<bool> {
        let player_id = candidate.player_id;
        let handle = self.table.reply_handle(&player_id)?;

        let max_retries = self.config.max_retries;
        let progress = self.table.note_outcome_miss(&player_id, candidate.stake, max_retries);
        handle.deliver(Outcome::retry_update(progress.count, progress.max_retries));

        if let Some(metrics) = &self.metrics {
            metrics.record_retry_miss();
        }

        if !progress.is_exhausted() {
            debug!(
                "Player '{}' unmatched - retry {}/{}",
                player_id, progress.count, progress.max_retries
            );
            self.mirror("update_retry_or_cooldown", |store| {
                store.update_retry_or_cooldown(&player_id, progress.count, None)
            });
            return Some(false);
        }

        self.table.remove(&player_id);
        self.table.apply_cooldown(&player_id, self.config.cooldown);
        handle.deliver(Outcome::cooldown_applied(progress.count, self.config.cooldown));

        let cooldown_until = utils::timestamp_after(self.config.cooldown);
        info!(
            "Player '{}' reached max retries ({}), cooldown for {}s",
            player_id,
            progress.count,
            self.config.cooldown.as_secs()
        );

        self.mirror("delete_entries", |store| {
            store.delete_entries(&[player_id.clone()])
        });
        self.mirror("update_retry_or_cooldown", |store| {
            store.update_retry_or_cooldown(&player_id, progress.count, Some(cooldown_until))
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_cooldown();
        }

        self.emit(MatchEvent::CooldownApplied(CooldownApplied {
            player_id,
            stake: candidate.stake,
            retries: progress.count,
            cooldown_until,
            timestamp: utils::current_timestamp(),
        }));
        Some(true)
    }

    /// Queued players ordered by enqueue instant, then identity
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.table.snapshot()
    }

    /// Lifecycle state and retry count of `player_id`
    pub fn player_state(&self, player_id: &str) -> PlayerStatus {
        let bet_amount = self.table.find(player_id);
        let state = if self.table.is_on_cooldown(player_id) {
            PlayerState::Cooldown
        } else if bet_amount.is_some() {
            PlayerState::Queued
        } else {
            PlayerState::Absent
        };

        PlayerStatus {
            player_id: player_id.to_string(),
            state,
            bet_amount,
            retries: self.table.retry_count(player_id),
        }
    }

    pub fn stats(&self) -> EngineStats {
        let players_on_cooldown = self
            .table
            .records()
            .filter(|(_, record)| record.cooldown.is_some())
            .count();

        EngineStats {
            players_waiting: self.table.queued_count(),
            players_on_cooldown,
            ..self.stats.clone()
        }
    }

    fn waited(&self, enqueued_at: Instant) -> Duration {
        self.table.now().saturating_duration_since(enqueued_at)
    }

    fn mirror<F>(&self, operation: &str, write: F)
    where
        F: FnOnce(&dyn QueueStore) -> crate::error::Result<()>,
    {
        if let Some(store) = &self.store {
            if let Err(e) = write(store.as_ref()) {
                warn!("Queue store {} failed: {}", operation, e);
            }
        }
    }

    fn emit(&self, event: MatchEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Match event channel closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::outcome::RecordingSink;
    use crate::scheduler::ManualScheduler;
    use crate::storage::MockQueueStore;
    use rust_decimal::Decimal;

    fn engine() -> (MatchmakingEngine, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let engine = MatchmakingEngine::new(QueueConfig::default(), Arc::new(scheduler.clone()));
        (engine, scheduler)
    }

    fn stake(amount: i64) -> Stake {
        Decimal::from(amount)
    }

    #[test]
    fn test_join_emits_joined_then_retry_update() {
        let (mut engine, _) = engine();
        let sink = RecordingSink::new();

        let status = engine.join("p1".to_string(), stake(10), sink.clone());

        assert_eq!(status, JoinStatus::Joined);
        assert_eq!(sink.event_names(), vec!["queue_joined", "retry_update"]);
        assert_eq!(engine.player_state("p1").retries, 1);
    }

    #[test]
    fn test_rejoin_reports_update_and_resets_retries() {
        let (mut engine, _) = engine();
        let sink = RecordingSink::new();

        engine.join("p1".to_string(), stake(10), sink.clone());
        engine.run_matching_pass();
        assert_eq!(engine.player_state("p1").retries, 2);

        let status = engine.join("p1".to_string(), stake(10), sink.clone());
        assert_eq!(status, JoinStatus::Updated);
        assert_eq!(
            sink.outcomes()[3],
            Outcome::queue_update(0),
            "rejoin should report a fresh retry count"
        );
        // The pass that follows the rejoin counts as the first miss again
        assert_eq!(engine.player_state("p1").retries, 1);
        assert_eq!(engine.snapshot().len(), 1);
    }

    #[test]
    fn test_pair_clears_timers_and_retries() {
        let (mut engine, scheduler) = engine();
        let p1 = RecordingSink::new();
        let p2 = RecordingSink::new();

        engine.join("p1".to_string(), stake(10), p1.clone());
        engine.join("p2".to_string(), stake(10), p2.clone());

        assert!(engine.snapshot().is_empty());
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(engine.player_state("p1").retries, 0);
        assert_eq!(engine.player_state("p1").state, PlayerState::Absent);
        assert_eq!(
            p1.last(),
            Some(Outcome::match_found("p2".to_string(), stake(10)))
        );
        assert_eq!(
            p2.last(),
            Some(Outcome::match_found("p1".to_string(), stake(10)))
        );
        assert_eq!(engine.stats().total_matches, 1);
    }

    #[test]
    fn test_leave_of_absent_player_is_noop() {
        let (mut engine, _) = engine();
        assert!(!engine.leave("ghost"));
        assert_eq!(engine.stats().total_leaves, 0);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let (mut engine, scheduler) = engine();
        let sink = RecordingSink::new();

        engine.join("p1".to_string(), stake(10), sink.clone());
        let stale = TimerEvent {
            kind: TimerKind::MatchTimeout,
            player_id: "p1".to_string(),
            token: 0,
        };
        assert!(!engine.handle_timer(stale));
        assert_eq!(engine.snapshot().len(), 1);

        let fired = scheduler.advance(Duration::from_secs(30));
        assert_eq!(fired.len(), 1);
        assert!(engine.handle_timer(fired[0].clone()));
        assert!(!engine.handle_timer(fired[0].clone()));
        assert_eq!(sink.count("match_timeout"), 1);
    }

    #[test]
    fn test_match_events_are_emitted() {
        let scheduler = ManualScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = MatchmakingEngine::new(QueueConfig::default(), Arc::new(scheduler))
            .with_event_sink(tx);

        engine.join("p1".to_string(), stake(25), RecordingSink::new());
        engine.join("p2".to_string(), stake(25), RecordingSink::new());

        match rx.try_recv() {
            Ok(MatchEvent::MatchFound(event)) => {
                assert_eq!(event.players, ["p1".to_string(), "p2".to_string()]);
                assert_eq!(event.stake, stake(25));
            }
            other => panic!("expected match event, got {:?}", other),
        }
    }

    #[test]
    fn test_store_receives_write_through() {
        let mut store = MockQueueStore::new();
        store
            .expect_upsert_queue_entry()
            .times(2)
            .returning(|_, _| Ok(()));
        store
            .expect_update_retry_or_cooldown()
            .withf(|player_id, retries, until| {
                player_id == "p1" && *retries == 1 && until.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_delete_entries()
            .withf(|players| players.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let scheduler = Arc::new(ManualScheduler::new());
        let mut engine =
            MatchmakingEngine::new(QueueConfig::default(), scheduler).with_store(Arc::new(store));

        engine.join("p1".to_string(), stake(10), RecordingSink::new());
        engine.join("p2".to_string(), stake(10), RecordingSink::new());
    }

    #[test]
    fn test_store_failure_does_not_change_outcome() {
        let mut store = MockQueueStore::new();
        store
            .expect_upsert_queue_entry()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));
        store
            .expect_update_retry_or_cooldown()
            .returning(|_, _, _| Err(anyhow::anyhow!("disk full")));

        let scheduler = Arc::new(ManualScheduler::new());
        let mut engine =
            MatchmakingEngine::new(QueueConfig::default(), scheduler).with_store(Arc::new(store));
        let sink = RecordingSink::new();

        assert_eq!(
            engine.join("p1".to_string(), stake(10), sink.clone()),
            JoinStatus::Joined
        );
        assert_eq!(engine.snapshot().len(), 1);
        assert_eq!(sink.count("queue_joined"), 1);
    }

    #[test]
    fn test_cooldown_expiry_forgets_the_player() {
        let (mut engine, scheduler) = engine();
        engine.join("p1".to_string(), stake(10), RecordingSink::new());
        engine.run_matching_pass();
        engine.run_matching_pass();
        assert_eq!(engine.player_state("p1").retries, 3);
        assert_eq!(engine.table.len(), 1);

        for event in scheduler.advance(Duration::from_secs(60)) {
            engine.handle_timer(event);
        }

        let status = engine.player_state("p1");
        assert_eq!(status.state, PlayerState::Absent);
        assert_eq!(status.retries, 0);
        assert!(engine.table.is_empty());
        assert_eq!(engine.stats().players_on_cooldown, 0);
    }

    #[test]
    fn test_stats_track_cooldown_population() {
        let (mut engine, _) = engine();
        engine.join("p1".to_string(), stake(10), RecordingSink::new());
        engine.run_matching_pass();
        engine.run_matching_pass();

        let stats = engine.stats();
        assert_eq!(stats.players_waiting, 0);
        assert_eq!(stats.players_on_cooldown, 1);
        assert_eq!(stats.total_cooldowns, 1);
        assert_eq!(stats.total_retry_misses, 3);
        assert_eq!(stats.total_passes, 3);
    }
}
