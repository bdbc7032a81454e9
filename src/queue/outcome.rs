//! Outcomes delivered to players and the sinks that carry them

use crate::types::{PlayerId, Stake};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Message sent to a player as the result of an engine operation.
///
/// Serialized as a JSON object tagged by `event`, with camelCase fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Outcome {
    QueueJoined {
        message: String,
        retries: u32,
    },
    QueueUpdate {
        message: String,
        retries: u32,
    },
    LeftQueue {
        message: String,
    },
    MatchFound {
        opponent: PlayerId,
        #[serde(with = "rust_decimal::serde::str")]
        bet_amount: Stake,
    },
    RetryUpdate {
        message: String,
        retries: u32,
        max_retries: u32,
    },
    Cooldown {
        message: String,
        retries: u32,
    },
    MatchTimeout {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Outcome {
    pub fn queue_joined(retries: u32) -> Self {
        Outcome::QueueJoined {
            message: "You have joined the queue.".to_string(),
            retries,
        }
    }

    pub fn queue_update(retries: u32) -> Self {
        Outcome::QueueUpdate {
            message: "You have been re-added to the queue.".to_string(),
            retries,
        }
    }

    pub fn left_queue() -> Self {
        Outcome::LeftQueue {
            message: "Removed from queue".to_string(),
        }
    }

    pub fn match_found(opponent: PlayerId, bet_amount: Stake) -> Self {
        Outcome::MatchFound {
            opponent,
            bet_amount,
        }
    }

    pub fn retry_update(retries: u32, max_retries: u32) -> Self {
        Outcome::RetryUpdate {
            message: format!("Retry attempt {} out of {}.", retries, max_retries),
            retries,
            max_retries,
        }
    }

    /// Sent when a player crosses the retry threshold
    pub fn cooldown_applied(retries: u32, cooldown: Duration) -> Self {
        Outcome::Cooldown {
            message: format!(
                "You have reached the maximum retries. Please wait {} seconds before rejoining the queue.",
                cooldown.as_secs()
            ),
            retries,
        }
    }

    /// Sent when a player on cooldown tries to join
    pub fn cooldown_active(retries: u32, remaining: Duration) -> Self {
        Outcome::Cooldown {
            message: format!(
                "You are in cooldown. Please wait {} seconds before rejoining the queue.",
                remaining.as_secs().max(1)
            ),
            retries,
        }
    }

    pub fn match_timeout() -> Self {
        Outcome::MatchTimeout {
            message: "You have been removed from the queue due to inactivity.".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            message: message.into(),
        }
    }

    /// Wire name of this outcome
    pub fn event_name(&self) -> &'static str {
        match self {
            Outcome::QueueJoined { .. } => "queue_joined",
            Outcome::QueueUpdate { .. } => "queue_update",
            Outcome::LeftQueue { .. } => "left_queue",
            Outcome::MatchFound { .. } => "match_found",
            Outcome::RetryUpdate { .. } => "retry_update",
            Outcome::Cooldown { .. } => "cooldown",
            Outcome::MatchTimeout { .. } => "match_timeout",
            Outcome::Error { .. } => "error",
        }
    }
}

/// Destination for a player's outcomes.
///
/// Delivery is fire-and-forget: the engine never waits on a sink and never
/// learns whether the player received the message.
pub trait OutcomeSink: Send + Sync {
    fn deliver(&self, outcome: Outcome);
}

/// Opaque per-player reply channel held by the engine
pub type ReplyHandle = Arc<dyn OutcomeSink>;

impl OutcomeSink for mpsc::UnboundedSender<Outcome> {
    fn deliver(&self, outcome: Outcome) {
        let event = outcome.event_name();
        if self.send(outcome).is_err() {
            debug!("Dropping '{}' outcome, reply channel closed", event);
        }
    }
}

/// Sink that records every outcome it receives (for testing)
#[derive(Debug, Default)]
pub struct RecordingSink {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All outcomes received so far
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .map(|outcomes| outcomes.clone())
            .unwrap_or_default()
    }

    /// Wire names of all outcomes received so far
    pub fn event_names(&self) -> Vec<&'static str> {
        self.outcomes().iter().map(Outcome::event_name).collect()
    }

    /// Number of received outcomes with the given wire name
    pub fn count(&self, event: &str) -> usize {
        self.outcomes()
            .iter()
            .filter(|outcome| outcome.event_name() == event)
            .count()
    }

    pub fn last(&self) -> Option<Outcome> {
        self.outcomes().last().cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.clear();
        }
    }
}

impl OutcomeSink for RecordingSink {
    fn deliver(&self, outcome: Outcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_match_found_wire_format() {
        let outcome = Outcome::match_found("p2".to_string(), Decimal::new(105, 1));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"event": "match_found", "opponent": "p2", "betAmount": "10.5"})
        );
    }

    #[test]
    fn test_match_found_keeps_every_stake_digit() {
        let stake: Decimal = "1234567890.123456789".parse().unwrap();
        let outcome = Outcome::match_found("p2".to_string(), stake);

        let text = serde_json::to_string(&outcome).unwrap();
        assert!(text.contains(r#""betAmount":"1234567890.123456789""#), "{}", text);

        let decoded: Outcome = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, outcome);
    }

    #[test]
    fn test_retry_update_wire_format() {
        let value = serde_json::to_value(Outcome::retry_update(2, 3)).unwrap();
        assert_eq!(value["event"], "retry_update");
        assert_eq!(value["message"], "Retry attempt 2 out of 3.");
        assert_eq!(value["retries"], 2);
        assert_eq!(value["maxRetries"], 3);
    }

    #[test]
    fn test_cooldown_message_mentions_wait() {
        let outcome = Outcome::cooldown_applied(3, Duration::from_secs(60));
        match outcome {
            Outcome::Cooldown { message, retries } => {
                assert_eq!(retries, 3);
                assert!(message.contains("60 seconds"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.deliver(Outcome::left_queue());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.deliver(Outcome::queue_joined(0));
        sink.deliver(Outcome::match_timeout());

        assert_eq!(sink.event_names(), vec!["queue_joined", "match_timeout"]);
        assert_eq!(sink.count("match_timeout"), 1);
        assert_eq!(sink.last(), Some(Outcome::match_timeout()));

        sink.clear();
        assert!(sink.outcomes().is_empty());
    }
}
