//! Shared, cloneable access to the engine

use crate::error::{MatchmakingError, Result};
use crate::queue::engine::{EngineStats, JoinStatus, MatchmakingEngine, PassSummary};
use crate::queue::outcome::ReplyHandle;
use crate::scheduler::TimerEvent;
use crate::types::{PlayerId, PlayerStatus, QueueEntry, Stake};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Cloneable handle that serializes all engine operations behind one lock.
///
/// Each call holds the lock for the whole operation, including the matching
/// pass a join triggers, so operations never interleave.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<MatchmakingEngine>>,
}

impl EngineHandle {
    pub fn new(engine: MatchmakingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MatchmakingEngine>> {
        self.inner.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire engine lock".to_string(),
            }
            .into()
        })
    }

    pub fn join(
        &self,
        player_id: PlayerId,
        stake: Stake,
        handle: ReplyHandle,
    ) -> Result<JoinStatus> {
        Ok(self.lock()?.join(player_id, stake, handle))
    }

    pub fn leave(&self, player_id: &str) -> Result<bool> {
        Ok(self.lock()?.leave(player_id))
    }

    pub fn handle_timer(&self, event: TimerEvent) -> Result<bool> {
        Ok(self.lock()?.handle_timer(event))
    }

    pub fn run_matching_pass(&self) -> Result<PassSummary> {
        Ok(self.lock()?.run_matching_pass())
    }

    pub fn snapshot(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.lock()?.snapshot())
    }

    pub fn player_state(&self, player_id: &str) -> Result<PlayerStatus> {
        Ok(self.lock()?.player_state(player_id))
    }

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(self.lock()?.stats())
    }
}

/// Feed fired timers back into the engine until the scheduler is dropped
pub async fn run_timer_dispatch(
    engine: EngineHandle,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
) {
    info!("Timer dispatch loop started");

    while let Some(event) = events.recv().await {
        if let Err(e) = engine.handle_timer(event) {
            warn!("Failed to apply timer event: {}", e);
        }
    }

    info!("Timer dispatch loop stopped");
}
