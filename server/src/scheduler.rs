//! Fixed-cadence tick scheduling for simulation rooms.
//!
//! Deadlines are absolute: the n-th tick is due at `origin + n * interval`,
//! independent of how long earlier ticks took, so slow ticks never push the
//! cadence back. When a tick is observed more than a full interval late the
//! missed deadlines are skipped instead of replayed in a burst; the physics
//! step still receives the measured elapsed time and bounds it with its
//! sub-step cap.

use std::time::{Duration, Instant};

/// A tick that became due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based tick counter since the scheduler was started.
    pub number: u64,
    /// Wall-clock time since the previous tick (or since start).
    pub elapsed: Duration,
    /// Deadlines that passed without a tick because this one ran late.
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    next_deadline: Option<Instant>,
    last_tick: Option<Instant>,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: None,
            last_tick: None,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking with the first tick due immediately. Returns false if
    /// the scheduler was already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_running() {
            return false;
        }
        self.next_deadline = Some(now);
        self.last_tick = Some(now);
        self.ticks = 0;
        true
    }

    /// Cancels any pending tick. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        self.last_tick = None;
        self.next_deadline.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.next_deadline.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Consumes the pending tick if it is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        let deadline = self.next_deadline?;
        if now < deadline {
            return None;
        }

        let mut next = deadline + self.interval;
        let mut skipped = 0;
        while next <= now {
            next += self.interval;
            skipped += 1;
        }
        self.next_deadline = Some(next);

        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.ticks += 1;

        Some(Tick {
            number: self.ticks,
            elapsed,
            skipped,
        })
    }
}
