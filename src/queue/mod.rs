//! In-memory matchmaking queue
//!
//! This module contains the player table, the registry and retry/cooldown
//! views over it, the pairing strategy, and the engine that ties them
//! together behind a single entry point.

pub mod engine;
pub mod handle;
pub mod matching;
pub mod outcome;
pub mod registry;
pub mod table;
pub mod tracker;

// Re-export commonly used types
pub use engine::{EngineStats, JoinStatus, MatchmakingEngine, PassSummary, QueueConfig};
pub use handle::{run_timer_dispatch, EngineHandle};
pub use matching::{ExactStakeMatcher, PairingStrategy, PassPlan};
pub use outcome::{Outcome, OutcomeSink, RecordingSink, ReplyHandle};
pub use registry::{Candidate, UpsertResult};
pub use table::PlayerTable;
pub use tracker::RetryProgress;
