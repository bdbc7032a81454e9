//! Manually advanced clock for deterministic tests and benchmarks

use super::{Scheduler, TimerEvent, TimerHandle};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    next_seq: u64,
    pending: BTreeMap<(Duration, u64), TimerEvent>,
}

/// Scheduler whose time only moves when [`ManualScheduler::advance`] is called.
///
/// Fired events are returned to the caller instead of being dispatched, so a
/// test decides exactly when the engine sees them.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                next_seq: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Move the clock forward and return every event that came due, in deadline order
    pub fn advance(&self, by: Duration) -> Vec<TimerEvent> {
        let mut state = self.lock();
        state.elapsed += by;

        let cutoff = (state.elapsed, u64::MAX);
        let still_pending = state.pending.split_off(&cutoff);
        let due = std::mem::replace(&mut state.pending, still_pending);
        due.into_values().collect()
    }

    /// Number of timers armed and not yet fired or cancelled
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Time elapsed since the scheduler was created
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // The state is only mutated by short non-panicking sections.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn schedule(&self, delay: Duration, event: TimerEvent) -> Box<dyn TimerHandle> {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let key = (state.elapsed + delay, seq);
        state.pending.insert(key, event);

        Box::new(ManualTimer {
            state: self.state.clone(),
            key,
        })
    }
}

struct ManualTimer {
    state: Arc<Mutex<ManualState>>,
    key: (Duration, u64),
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.pending.remove(&self.key);
    }
}
