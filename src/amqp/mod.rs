//! AMQP integration for the matchmaking service
//!
//! Matches and cooldowns leave the engine as [`crate::types::MatchEvent`]s;
//! this module publishes them to a topic exchange for downstream services.

pub mod connection;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use messages::*;
pub use publisher::{
    forward_match_events, AmqpEventPublisher, EventPublisher, MockEventPublisher, PublisherConfig,
};
