//! Monotonic time source
//!
//! The filter stamps buffered events with their arrival time and uses the
//! difference to "now" as the replay offset. Event timestamps and the clock
//! must share one timeline; [`MonotonicClock`] counts from process start,
//! [`ManualClock`] is driven explicitly (trace replay, tests).

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of "now" on the event timeline
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> Duration;
}

/// Wall clock measured from construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Clock reading `start`
    pub fn new(start: Duration) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `time`; moving backwards is ignored
    pub fn set(&self, time: Duration) {
        let mut now = self.now.lock();
        if time > *now {
            *now = time;
        }
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
