//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = String;

/// Wager amount a player queues with. Matching requires exact equality.
pub type Stake = Decimal;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// One row of the public queue listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub player_id: PlayerId,
    #[serde(with = "rust_decimal::serde::str")]
    pub bet_amount: Stake,
}

/// Lifecycle state of a player as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Absent,
    Queued,
    Cooldown,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Absent => write!(f, "absent"),
            PlayerState::Queued => write!(f, "queued"),
            PlayerState::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Point-in-time view of a single player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub player_id: PlayerId,
    pub state: PlayerState,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub bet_amount: Option<Stake>,
    pub retries: u32,
}

/// Event emitted when two players are paired
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFound {
    pub match_id: MatchId,
    pub players: [PlayerId; 2],
    pub stake: Stake,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a player exhausts its retries and is put on cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownApplied {
    pub player_id: PlayerId,
    pub stake: Stake,
    pub retries: u32,
    pub cooldown_until: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all events published outside the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchFound(MatchFound),
    CooldownApplied(CooldownApplied),
}
