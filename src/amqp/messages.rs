//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::MatchEvent;
use serde_json;

/// Default exchange for outbound match events
pub const MATCH_EVENTS_EXCHANGE: &str = "wager.match_events";

/// Routing keys for events
pub const MATCH_FOUND_ROUTING_KEY: &str = "match.found";
pub const PLAYER_COOLDOWN_ROUTING_KEY: &str = "player.cooldown";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message routing utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Get routing key for a match event
    pub fn routing_key(event: &MatchEvent) -> &'static str {
        match event {
            MatchEvent::MatchFound(_) => MATCH_FOUND_ROUTING_KEY,
            MatchEvent::CooldownApplied(_) => PLAYER_COOLDOWN_ROUTING_KEY,
        }
    }

    /// Wrap a match event in an envelope addressed by its routing key
    pub fn envelope(event: MatchEvent) -> MessageEnvelope<MatchEvent> {
        let routing_key = Self::routing_key(&event).to_string();
        MessageEnvelope::new(event, routing_key)
    }
}
