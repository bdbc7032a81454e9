//! Delayed, cancelable timer events
//!
//! The engine never sleeps. It asks a [`Scheduler`] to deliver a
//! [`TimerEvent`] after a delay and keeps the returned [`TimerHandle`] so the
//! timer can be cancelled when the player leaves, matches or rejoins.
//! Production uses [`TokioScheduler`]; tests drive a [`ManualScheduler`].

pub mod manual;
pub mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use crate::types::PlayerId;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifies one arming of a timer. A fired event is only honoured while the
/// owning record still holds a timer with the same token.
pub type TimerToken = u64;

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Player waited too long without a match
    MatchTimeout,
    /// Player's cooldown window is over
    CooldownExpiry,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::MatchTimeout => write!(f, "match_timeout"),
            TimerKind::CooldownExpiry => write!(f, "cooldown_expiry"),
        }
    }
}

/// Event delivered back to the engine once a timer elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub player_id: PlayerId,
    pub token: TimerToken,
}

/// Handle to an armed timer
pub trait TimerHandle: Send + Sync {
    /// Prevent the timer from firing. Idempotent.
    fn cancel(&self);
}

/// Source of time and delayed events
pub trait Scheduler: Send + Sync {
    /// Current instant according to this scheduler's clock
    fn now(&self) -> Instant;

    /// Deliver `event` after `delay` unless the returned handle is cancelled first
    fn schedule(&self, delay: Duration, event: TimerEvent) -> Box<dyn TimerHandle>;
}

/// A timer the engine is holding on to
pub struct ArmedTimer {
    pub token: TimerToken,
    handle: Box<dyn TimerHandle>,
}

impl ArmedTimer {
    pub fn new(token: TimerToken, handle: Box<dyn TimerHandle>) -> Self {
        Self { token, handle }
    }

    /// Cancel the underlying timer and consume the record of it
    pub fn cancel(self) {
        self.handle.cancel();
    }
}

impl fmt::Debug for ArmedTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmedTimer")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
