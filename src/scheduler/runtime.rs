//! Scheduler backed by the tokio runtime

use super::{Scheduler, TimerEvent, TimerHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawns one sleeping task per timer and forwards fired events to a channel.
///
/// The receiving half is returned from [`TokioScheduler::new`]; the service
/// runs a single dispatch loop over it that feeds events back into the engine.
pub struct TokioScheduler {
    runtime: Handle,
    events_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl TokioScheduler {
    /// Create a scheduler bound to the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        Self::with_runtime(Handle::current())
    }

    /// Create a scheduler bound to an explicit runtime handle
    pub fn with_runtime(runtime: Handle) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Self { runtime, events_tx }, events_rx)
    }
}

impl Scheduler for TokioScheduler {
    /// Reads tokio's clock so waits line up with timer firing under paused time
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&self, delay: Duration, event: TimerEvent) -> Box<dyn TimerHandle> {
        let events_tx = self.events_tx.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(
                "Timer fired - kind: {}, player: '{}', token: {}",
                event.kind, event.player_id, event.token
            );
            if events_tx.send(event).is_err() {
                debug!("Timer dispatch channel closed, dropping event");
            }
        });

        Box::new(SpawnedTimer { task })
    }
}

struct SpawnedTimer {
    task: JoinHandle<()>,
}

impl TimerHandle for SpawnedTimer {
    fn cancel(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TimerKind;

    fn event(token: u64) -> TimerEvent {
        TimerEvent {
            kind: TimerKind::MatchTimeout,
            player_id: "p1".to_string(),
            token,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (scheduler, mut events) = TokioScheduler::new();
        let _handle = scheduler.schedule(Duration::from_secs(30), event(1));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(events.try_recv().is_err());

        let fired = events.recv().await.expect("timer should fire");
        assert_eq!(fired, event(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_runtime_clock() {
        let (scheduler, _events) = TokioScheduler::new();
        let before = scheduler.now();

        tokio::time::advance(Duration::from_secs(90)).await;

        assert!(scheduler.now() - before >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (scheduler, mut events) = TokioScheduler::new();
        let handle = scheduler.schedule(Duration::from_secs(5), event(7));
        handle.cancel();

        let _other = scheduler.schedule(Duration::from_secs(10), event(8));

        let fired = events.recv().await.expect("second timer should fire");
        assert_eq!(fired.token, 8);
    }
}
