//! Per-player record table
//!
//! Queue membership, the match timer, retry progress and the cooldown window
//! for one identity all live in a single [`PlayerRecord`]. The registry and
//! tracker contracts (see `registry.rs` and `tracker.rs`) are both views over
//! this one table, so no update can leave the fields out of step.
//!
//! Idle records are pruned. A record outlives its queue entry while it still
//! carries a retry count, so a player that timed out with misses stays here
//! until it rejoins. The engine resets the count when a cooldown lapses, so
//! cooled-down players are dropped at expiry.

use crate::queue::outcome::ReplyHandle;
use crate::scheduler::{ArmedTimer, Scheduler, TimerEvent, TimerKind, TimerToken};
use crate::types::{PlayerId, Stake};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A player currently waiting in the queue
pub struct QueuedPlayer {
    pub stake: Stake,
    pub handle: ReplyHandle,
    pub enqueued_at: Instant,
    pub(crate) timer: Option<ArmedTimer>,
}

impl fmt::Debug for QueuedPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedPlayer")
            .field("stake", &self.stake)
            .field("enqueued_at", &self.enqueued_at)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

/// Consecutive unmatched passes at one stake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRecord {
    pub count: u32,
    pub stake: Stake,
}

/// Active suppression window
#[derive(Debug)]
pub struct CooldownWindow {
    pub expires_at: Instant,
    pub(crate) timer: ArmedTimer,
}

/// Everything the engine knows about one identity
#[derive(Debug, Default)]
pub struct PlayerRecord {
    pub queued: Option<QueuedPlayer>,
    pub retry: Option<RetryRecord>,
    pub cooldown: Option<CooldownWindow>,
}

impl PlayerRecord {
    /// A record with nothing worth remembering can be dropped
    fn is_idle(&self) -> bool {
        self.queued.is_none()
            && self.cooldown.is_none()
            && self.retry.map_or(true, |retry| retry.count == 0)
    }
}

/// Indexed table of player records plus the scheduler used to arm their timers
pub struct PlayerTable {
    records: HashMap<PlayerId, PlayerRecord>,
    scheduler: Arc<dyn Scheduler>,
    next_token: TimerToken,
}

impl PlayerTable {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            records: HashMap::new(),
            scheduler,
            next_token: 1,
        }
    }

    /// Current instant on the table's clock
    pub fn now(&self) -> Instant {
        self.scheduler.now()
    }

    pub fn record(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.records.get(player_id)
    }

    pub(crate) fn record_mut(&mut self, player_id: &str) -> Option<&mut PlayerRecord> {
        self.records.get_mut(player_id)
    }

    pub(crate) fn record_entry(&mut self, player_id: &PlayerId) -> &mut PlayerRecord {
        self.records.entry(player_id.clone()).or_default()
    }

    /// Iterate over every record in the table
    pub fn records(&self) -> impl Iterator<Item = (&PlayerId, &PlayerRecord)> {
        self.records.iter()
    }

    /// Number of identities the table currently remembers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop the record for `player_id` if it no longer carries any state
    pub(crate) fn prune(&mut self, player_id: &str) {
        if self
            .records
            .get(player_id)
            .is_some_and(PlayerRecord::is_idle)
        {
            self.records.remove(player_id);
        }
    }

    /// Schedule a timer of `kind` for `player_id` with a fresh token
    pub(crate) fn arm(
        &mut self,
        kind: TimerKind,
        player_id: &PlayerId,
        delay: Duration,
    ) -> ArmedTimer {
        let token = self.next_token;
        self.next_token += 1;

        let handle = self.scheduler.schedule(
            delay,
            TimerEvent {
                kind,
                player_id: player_id.clone(),
                token,
            },
        );

        ArmedTimer::new(token, handle)
    }
}

impl fmt::Debug for PlayerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerTable")
            .field("records", &self.records)
            .field("next_token", &self.next_token)
            .finish_non_exhaustive()
    }
}
