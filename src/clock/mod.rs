use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Wall-clock source used to timestamp aggregation buckets.
pub trait Clock: Send + Sync {
    /// Return the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Clock backed by the operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        millis_since_epoch(SystemTime::now())
    }
}

/// Convert a system time to milliseconds since the Unix epoch.
/// Times before the epoch read as 0.
pub fn millis_since_epoch(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Deterministic clock for tests and benchmarks.
///
/// A scripted clock hands out its readings in order, one per call to
/// [`Clock::now_millis`]. Once the script runs out it keeps returning the
/// last reading until it is moved with [`ManualClock::set`] or
/// [`ManualClock::advance`].
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    script: VecDeque<u64>,
    current: u64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                script: VecDeque::new(),
                current: start_ms,
            }),
        }
    }

    /// Create a clock that returns the given readings in order.
    pub fn scripted(readings: impl IntoIterator<Item = u64>) -> Self {
        let script: VecDeque<u64> = readings.into_iter().collect();
        let current = script.front().copied().unwrap_or(0);

        Self {
            state: Mutex::new(ManualState { script, current }),
        }
    }

    /// Move the clock to `ms`, discarding any remaining scripted readings.
    pub fn set(&self, ms: u64) {
        let mut state = self.state.lock();
        state.script.clear();
        state.current = ms;
    }

    /// Move the clock forward by `delta_ms`, discarding any remaining
    /// scripted readings.
    pub fn advance(&self, delta_ms: u64) {
        let mut state = self.state.lock();
        state.script.clear();
        state.current = state.current.saturating_add(delta_ms);
    }

    /// Number of scripted readings not yet handed out.
    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(next) = state.script.pop_front() {
            state.current = next;
        }
        state.current
    }
}
