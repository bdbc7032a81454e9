//! Queue storage interface and implementations
//!
//! The engine keeps all authoritative state in memory. A [`QueueStore`] is an
//! optional write-through mirror of it that other processes can read; the
//! engine logs store failures and carries on.

use crate::error::{MatchmakingError, Result};
use crate::types::{PlayerId, QueueEntry, Stake};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Stored state for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlayerState {
    pub player_id: PlayerId,
    pub bet_amount: Option<Stake>,
    pub queued: bool,
    pub retries: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl StoredPlayerState {
    fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            bet_amount: None,
            queued: false,
            retries: 0,
            cooldown_until: None,
            joined_at: None,
            last_updated: Utc::now(),
        }
    }

    /// Whether the stored cooldown is still in force at `now`
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// Trait for queue persistence operations
#[cfg_attr(test, mockall::automock)]
pub trait QueueStore: Send + Sync {
    /// Record that a player is queued at `stake`
    fn upsert_queue_entry(&self, player_id: &PlayerId, stake: Stake) -> Result<()>;

    /// Read a player's retry and cooldown state
    fn read_cooldown_state(&self, player_id: &PlayerId) -> Result<Option<StoredPlayerState>>;

    /// List every queued player with its stake, oldest first
    fn list_queued(&self) -> Result<Vec<QueueEntry>>;

    /// Remove players from the queue
    fn delete_entries(&self, player_ids: &[PlayerId]) -> Result<()>;

    /// Store a player's retry count and cooldown expiry (`None` clears it)
    fn update_retry_or_cooldown(
        &self,
        player_id: &PlayerId,
        retries: u32,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// In-memory queue store implementation
#[derive(Debug)]
pub struct InMemoryQueueStore {
    entries: RwLock<HashMap<PlayerId, StoredPlayerState>>,
    max_entries: usize,
}

impl InMemoryQueueStore {
    /// Create a new in-memory store holding at most `max_entries` players
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Number of players the store currently remembers
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<PlayerId, StoredPlayerState>>> {
        self.entries.read().map_err(|_| {
            MatchmakingError::StorageFailed {
                message: "Failed to acquire queue store read lock".to_string(),
            }
            .into()
        })
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PlayerId, StoredPlayerState>>> {
        self.entries.write().map_err(|_| {
            MatchmakingError::StorageFailed {
                message: "Failed to acquire queue store write lock".to_string(),
            }
            .into()
        })
    }

    /// Drop idle entries, oldest first, once the store grows past its limit
    fn cleanup_if_needed(entries: &mut HashMap<PlayerId, StoredPlayerState>, max_entries: usize) {
        if entries.len() <= max_entries {
            return;
        }

        let now = Utc::now();
        let mut idle: Vec<_> = entries
            .values()
            .filter(|state| !state.queued && !state.is_on_cooldown(now))
            .map(|state| (state.player_id.clone(), state.last_updated))
            .collect();
        idle.sort_by(|a, b| a.1.cmp(&b.1));

        let to_remove = entries.len() - max_entries;
        for (player_id, _) in idle.into_iter().take(to_remove) {
            entries.remove(&player_id);
        }
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new(10000)
    }
}

impl QueueStore for InMemoryQueueStore {
    fn upsert_queue_entry(&self, player_id: &PlayerId, stake: Stake) -> Result<()> {
        let mut entries = self.write()?;
        let now = Utc::now();

        let state = entries
            .entry(player_id.clone())
            .or_insert_with(|| StoredPlayerState::new(player_id.clone()));
        state.bet_amount = Some(stake);
        state.queued = true;
        state.joined_at = Some(now);
        state.last_updated = now;

        Self::cleanup_if_needed(&mut entries, self.max_entries);
        Ok(())
    }

    fn read_cooldown_state(&self, player_id: &PlayerId) -> Result<Option<StoredPlayerState>> {
        Ok(self.read()?.get(player_id).cloned())
    }

    fn list_queued(&self) -> Result<Vec<QueueEntry>> {
        let entries = self.read()?;

        let mut queued: Vec<_> = entries
            .values()
            .filter(|state| state.queued)
            .filter_map(|state| {
                state
                    .bet_amount
                    .map(|stake| (state.joined_at, state.player_id.clone(), stake))
            })
            .collect();
        queued.sort();

        Ok(queued
            .into_iter()
            .map(|(_, player_id, bet_amount)| QueueEntry {
                player_id,
                bet_amount,
            })
            .collect())
    }

    fn delete_entries(&self, player_ids: &[PlayerId]) -> Result<()> {
        let mut entries = self.write()?;
        let now = Utc::now();

        for player_id in player_ids {
            if let Some(state) = entries.get_mut(player_id) {
                state.queued = false;
                state.joined_at = None;
                state.last_updated = now;
            }
        }
        Ok(())
    }

    fn update_retry_or_cooldown(
        &self,
        player_id: &PlayerId,
        retries: u32,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut entries = self.write()?;

        let state = entries
            .entry(player_id.clone())
            .or_insert_with(|| StoredPlayerState::new(player_id.clone()));
        state.retries = retries;
        state.cooldown_until = cooldown_until;
        state.last_updated = Utc::now();

        Self::cleanup_if_needed(&mut entries, self.max_entries);
        Ok(())
    }
}
