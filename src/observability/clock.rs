//! Time sources for latency measurement and record timestamps.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Monotonic instant used for latency.
    fn now(&self) -> Instant;

    /// Wall time stamped on the emitted record.
    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock: every `now()` call moves forward by a fixed step.
///
/// Wall time is pinned to the value given at construction.
#[derive(Debug)]
pub struct SteppingClock {
    origin: Instant,
    step: Duration,
    ticks: AtomicU32,
    wall: DateTime<Utc>,
}

impl SteppingClock {
    pub fn new(step: Duration, wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            step,
            ticks: AtomicU32::new(0),
            wall,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.origin + self.step * tick
    }

    fn wall(&self) -> DateTime<Utc> {
        self.wall
    }
}
