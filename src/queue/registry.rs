//! Player registry: the set of players waiting for a match

use crate::queue::outcome::ReplyHandle;
use crate::queue::table::{PlayerTable, QueuedPlayer};
use crate::scheduler::{TimerKind, TimerToken};
use crate::types::{PlayerId, QueueEntry, Stake};
use std::time::{Duration, Instant};
use tracing::debug;

/// What an upsert did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// Player was not queued before
    Inserted,
    /// Player was already queued at the same stake
    Refreshed,
    /// Player was already queued and moved to a different stake
    StakeChanged { previous: Stake },
}

/// A queued player as seen by the matching pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub player_id: PlayerId,
    pub stake: Stake,
    pub enqueued_at: Instant,
}

impl PlayerTable {
    /// Insert `player_id` into the queue or replace its stake and handle in place.
    ///
    /// The enqueue instant is refreshed to `now` either way. Any armed match
    /// timer is left alone; callers re-arm it with [`PlayerTable::arm_match_timer`].
    pub fn upsert(
        &mut self,
        player_id: &PlayerId,
        stake: Stake,
        handle: ReplyHandle,
        now: Instant,
    ) -> UpsertResult {
        let record = self.record_entry(player_id);

        match record.queued.as_mut() {
            Some(queued) => {
                let previous = queued.stake;
                queued.stake = stake;
                queued.handle = handle;
                queued.enqueued_at = now;

                if previous == stake {
                    UpsertResult::Refreshed
                } else {
                    UpsertResult::StakeChanged { previous }
                }
            }
            None => {
                record.queued = Some(QueuedPlayer {
                    stake,
                    handle,
                    enqueued_at: now,
                    timer: None,
                });
                UpsertResult::Inserted
            }
        }
    }

    /// Arm (or re-arm) the match-wait timer for a queued player.
    ///
    /// Any previously armed timer is cancelled first. Returns `None` if the
    /// player is not queued.
    pub fn arm_match_timer(
        &mut self,
        player_id: &PlayerId,
        timeout: Duration,
    ) -> Option<TimerToken> {
        if self.find(player_id).is_none() {
            return None;
        }

        let timer = self.arm(TimerKind::MatchTimeout, player_id, timeout);
        let token = timer.token;

        let Some(queued) = self
            .record_mut(player_id)
            .and_then(|record| record.queued.as_mut())
        else {
            timer.cancel();
            return None;
        };
        if let Some(previous) = queued.timer.replace(timer) {
            previous.cancel();
        }

        Some(token)
    }

    /// Remove `player_id` from the queue and cancel its match timer.
    ///
    /// Retry progress and any cooldown window are left untouched. Returns the
    /// removed entry, or `None` if the player was not queued.
    pub fn remove(&mut self, player_id: &str) -> Option<QueuedPlayer> {
        let mut removed = self.record_mut(player_id)?.queued.take()?;
        if let Some(timer) = removed.timer.take() {
            timer.cancel();
        }
        self.prune(player_id);

        debug!("Player '{}' removed from registry", player_id);
        Some(removed)
    }

    /// Stake of `player_id` if it is queued
    pub fn find(&self, player_id: &str) -> Option<Stake> {
        self.record(player_id)?.queued.as_ref().map(|queued| queued.stake)
    }

    /// Reply handle of `player_id` if it is queued
    pub fn reply_handle(&self, player_id: &str) -> Option<ReplyHandle> {
        self.record(player_id)?
            .queued
            .as_ref()
            .map(|queued| queued.handle.clone())
    }

    /// Token of the currently armed match timer for `player_id`
    pub fn match_timer_token(&self, player_id: &str) -> Option<TimerToken> {
        self.record(player_id)?
            .queued
            .as_ref()?
            .timer
            .as_ref()
            .map(|timer| timer.token)
    }

    /// Queued players ordered by enqueue instant, ties broken by identity
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .records()
            .filter_map(|(player_id, record)| {
                record.queued.as_ref().map(|queued| Candidate {
                    player_id: player_id.clone(),
                    stake: queued.stake,
                    enqueued_at: queued.enqueued_at,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        candidates
    }

    /// Read-only listing of every queued player in a stable order
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.candidates()
            .into_iter()
            .map(|candidate| QueueEntry {
                player_id: candidate.player_id,
                bet_amount: candidate.stake,
            })
            .collect()
    }

    /// Number of queued players
    pub fn queued_count(&self) -> usize {
        self.records()
            .filter(|(_, record)| record.queued.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::outcome::RecordingSink;
    use crate::scheduler::{ManualScheduler, Scheduler};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn table() -> (PlayerTable, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        (PlayerTable::new(Arc::new(scheduler.clone())), scheduler)
    }

    #[test]
    fn test_upsert_inserts_then_updates_in_place() {
        let (mut table, scheduler) = table();
        let player = "p1".to_string();
        let sink = RecordingSink::new();

        let first = table.upsert(&player, Stake::from(10), sink.clone(), scheduler.now());
        assert_eq!(first, UpsertResult::Inserted);

        let second = table.upsert(&player, Stake::from(10), sink.clone(), scheduler.now());
        assert_eq!(second, UpsertResult::Refreshed);

        let third = table.upsert(&player, Stake::from(20), sink, scheduler.now());
        assert_eq!(
            third,
            UpsertResult::StakeChanged {
                previous: Stake::from(10)
            }
        );

        assert_eq!(table.queued_count(), 1);
        assert_eq!(table.find(&player), Some(Stake::from(20)));
    }

    #[test]
    fn test_rearming_cancels_previous_timer() {
        let (mut table, scheduler) = table();
        let player = "p1".to_string();
        table.upsert(&player, Stake::from(10), RecordingSink::new(), scheduler.now());

        let first = table.arm_match_timer(&player, Duration::from_secs(30));
        let second = table.arm_match_timer(&player, Duration::from_secs(30));

        assert_ne!(first, second);
        assert_eq!(table.match_timer_token(&player), second);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_arm_requires_queued_player() {
        let (mut table, scheduler) = table();
        assert!(table
            .arm_match_timer(&"ghost".to_string(), Duration::from_secs(30))
            .is_none());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_remove_cancels_timer_and_is_idempotent() {
        let (mut table, scheduler) = table();
        let player = "p1".to_string();
        table.upsert(&player, Stake::from(10), RecordingSink::new(), scheduler.now());
        table.arm_match_timer(&player, Duration::from_secs(30));

        assert!(table.remove(&player).is_some());
        assert_eq!(scheduler.pending_count(), 0);
        assert!(table.remove(&player).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_orders_by_enqueue_then_identity() {
        let (mut table, scheduler) = table();
        let sink = RecordingSink::new();
        let now = scheduler.now();

        table.upsert(&"b".to_string(), Stake::from(5), sink.clone(), now);
        table.upsert(&"a".to_string(), Stake::from(5), sink.clone(), now);
        scheduler.advance(Duration::from_secs(1));
        table.upsert(&"0".to_string(), Stake::from(7), sink, scheduler.now());

        let ids: Vec<_> = table
            .snapshot()
            .into_iter()
            .map(|entry| entry.player_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "0"]);
    }

    proptest! {
        #[test]
        fn prop_registry_never_duplicates_identity(
            ops in prop::collection::vec((0u8..6, 1i64..4, any::<bool>()), 1..60)
        ) {
            let (mut table, scheduler) = table();
            let sink = RecordingSink::new();

            for (id, stake, is_join) in ops {
                let player = format!("p{}", id);
                if is_join {
                    table.upsert(&player, Stake::from(stake), sink.clone(), scheduler.now());
                    table.arm_match_timer(&player, Duration::from_secs(30));
                } else {
                    table.remove(&player);
                }

                let snapshot = table.snapshot();
                let mut ids: Vec<_> = snapshot.iter().map(|e| e.player_id.clone()).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), snapshot.len());
                prop_assert_eq!(scheduler.pending_count(), snapshot.len());
            }
        }
    }
}
