//! Wager Match - stake-based matchmaking service
//!
//! Players join a queue with a bet amount and are paired first-come
//! first-served with another player who staked exactly the same amount.
//! Players who keep missing a match are put on cooldown, and players who
//! wait too long are timed out of the queue.

pub mod amqp;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use queue::{EngineHandle, MatchmakingEngine, Outcome, QueueConfig};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
