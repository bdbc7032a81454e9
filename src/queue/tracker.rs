//! Retry and cooldown tracking
//!
//! Retry progress and cooldown windows outlive queue membership: a player
//! removed from the registry keeps its count, and a cooldown keeps blocking
//! joins until its own timer clears it.

use crate::queue::table::{CooldownWindow, PlayerTable, RetryRecord};
use crate::scheduler::{TimerKind, TimerToken};
use crate::types::{PlayerId, Stake};
use std::time::{Duration, Instant};
use tracing::debug;

/// Retry count after a miss, together with the configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProgress {
    pub count: u32,
    pub max_retries: u32,
}

impl RetryProgress {
    /// Whether the player has used up its retries
    pub fn is_exhausted(&self) -> bool {
        self.count >= self.max_retries
    }
}

impl PlayerTable {
    /// Record that `player_id` went unmatched for a pass while queued at `stake`.
    ///
    /// Progress is bound to one stake: if the bound stake differs, the count
    /// restarts from zero at the new stake before being incremented.
    pub fn note_outcome_miss(
        &mut self,
        player_id: &PlayerId,
        stake: Stake,
        max_retries: u32,
    ) -> RetryProgress {
        let record = self.record_entry(player_id);
        let retry = record.retry.get_or_insert(RetryRecord { count: 0, stake });

        if retry.stake != stake {
            debug!(
                "Player '{}' retry progress rebound from stake {} to {}",
                player_id, retry.stake, stake
            );
            retry.count = 0;
            retry.stake = stake;
        }
        retry.count += 1;

        RetryProgress {
            count: retry.count,
            max_retries,
        }
    }

    /// Reset the retry count of `player_id` to zero, keeping the bound stake
    pub fn reset(&mut self, player_id: &str) {
        if let Some(retry) = self
            .record_mut(player_id)
            .and_then(|record| record.retry.as_mut())
        {
            retry.count = 0;
        }
        self.prune(player_id);
    }

    /// Current retry count of `player_id`
    pub fn retry_count(&self, player_id: &str) -> u32 {
        self.record(player_id)
            .and_then(|record| record.retry)
            .map_or(0, |retry| retry.count)
    }

    pub fn is_on_cooldown(&self, player_id: &str) -> bool {
        self.record(player_id)
            .is_some_and(|record| record.cooldown.is_some())
    }

    /// Time left on the cooldown of `player_id`, if any
    pub fn cooldown_remaining(&self, player_id: &str) -> Option<Duration> {
        let expires_at = self.record(player_id)?.cooldown.as_ref()?.expires_at;
        Some(expires_at.saturating_duration_since(self.now()))
    }

    /// Install a cooldown window for `player_id` lasting `duration`.
    ///
    /// A scheduler timer clears the window when it lapses. An existing window
    /// is replaced and its timer cancelled. Returns the expiry instant.
    pub fn apply_cooldown(&mut self, player_id: &PlayerId, duration: Duration) -> Instant {
        let expires_at = self.now() + duration;
        let timer = self.arm(TimerKind::CooldownExpiry, player_id, duration);

        let record = self.record_entry(player_id);
        if let Some(previous) = record.cooldown.replace(CooldownWindow { expires_at, timer }) {
            previous.timer.cancel();
        }

        expires_at
    }

    /// Clear the cooldown window of `player_id` if it was armed with `token`.
    ///
    /// Returns `false` for stale timer events.
    pub fn clear_cooldown(&mut self, player_id: &str, token: TimerToken) -> bool {
        let Some(record) = self.record_mut(player_id) else {
            return false;
        };

        let matches = record
            .cooldown
            .as_ref()
            .is_some_and(|window| window.timer.token == token);
        if matches {
            record.cooldown = None;
            self.prune(player_id);
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::sync::Arc;

    fn table() -> (PlayerTable, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        (PlayerTable::new(Arc::new(scheduler.clone())), scheduler)
    }

    #[test]
    fn test_miss_increments_from_zero() {
        let (mut table, _) = table();
        let player = "p1".to_string();

        let first = table.note_outcome_miss(&player, Stake::from(10), 3);
        assert_eq!(first.count, 1);
        assert!(!first.is_exhausted());

        table.note_outcome_miss(&player, Stake::from(10), 3);
        let third = table.note_outcome_miss(&player, Stake::from(10), 3);
        assert_eq!(third.count, 3);
        assert!(third.is_exhausted());
    }

    #[test]
    fn test_miss_at_new_stake_restarts_count() {
        let (mut table, _) = table();
        let player = "p1".to_string();

        table.note_outcome_miss(&player, Stake::from(10), 3);
        table.note_outcome_miss(&player, Stake::from(10), 3);
        let progress = table.note_outcome_miss(&player, Stake::from(20), 3);

        assert_eq!(progress.count, 1);
        assert_eq!(
            table.record(&player).and_then(|r| r.retry).map(|r| r.stake),
            Some(Stake::from(20))
        );
    }

    #[test]
    fn test_reset_keeps_bound_stake() {
        let (mut table, _) = table();
        let player = "p1".to_string();

        table.note_outcome_miss(&player, Stake::from(10), 3);
        table.reset(&player);
        assert_eq!(table.retry_count(&player), 0);

        table.reset(&"never-seen".to_string());
        assert_eq!(table.retry_count("never-seen"), 0);
    }

    #[test]
    fn test_cooldown_clears_only_with_matching_token() {
        let (mut table, scheduler) = table();
        let player = "p1".to_string();

        table.apply_cooldown(&player, Duration::from_secs(60));
        assert!(table.is_on_cooldown(&player));
        assert_eq!(
            table.cooldown_remaining(&player),
            Some(Duration::from_secs(60))
        );

        let fired = scheduler.advance(Duration::from_secs(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TimerKind::CooldownExpiry);

        assert!(!table.clear_cooldown(&player, fired[0].token + 100));
        assert!(table.is_on_cooldown(&player));

        assert!(table.clear_cooldown(&player, fired[0].token));
        assert!(!table.is_on_cooldown(&player));
    }

    #[test]
    fn test_reapplying_cooldown_replaces_timer() {
        let (mut table, scheduler) = table();
        let player = "p1".to_string();

        table.apply_cooldown(&player, Duration::from_secs(60));
        table.apply_cooldown(&player, Duration::from_secs(60));
        assert_eq!(scheduler.pending_count(), 1);
    }
}
