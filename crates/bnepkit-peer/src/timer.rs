//! Per-channel handshake timers.
//!
//! The engine only arms and disarms timers. Whoever drives it reports an
//! expiry back through [`Bnep::handle_timeout`](crate::Bnep::handle_timeout).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

/// Timer scheduling service the engine arms handshake timers on.
pub trait TimerService {
    /// Arm (or re-arm) the timer for `cid`.
    fn start(&mut self, cid: u16, timeout: Duration);

    /// Disarm the timer for `cid`. Disarming an idle timer is a no-op.
    fn stop(&mut self, cid: u16);
}

/// Timer double that records arming without ever firing.
#[derive(Debug, Default)]
pub struct ManualTimers {
    armed: HashMap<u16, Duration>,
    starts: usize,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, cid: u16) -> bool {
        self.armed.contains_key(&cid)
    }

    pub fn timeout(&self, cid: u16) -> Option<Duration> {
        self.armed.get(&cid).copied()
    }

    /// Number of `start` calls so far.
    pub fn starts(&self) -> usize {
        self.starts
    }
}

impl TimerService for ManualTimers {
    fn start(&mut self, cid: u16, timeout: Duration) {
        self.starts += 1;
        self.armed.insert(cid, timeout);
    }

    fn stop(&mut self, cid: u16) {
        self.armed.remove(&cid);
    }
}

/// Deadline-based timers polled by an event loop.
#[derive(Debug)]
pub struct DeadlineTimers {
    deadlines: HashMap<u16, Instant>,
    clock: fn() -> Instant,
}

impl Default for DeadlineTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadlineTimers {
    pub fn new() -> Self {
        Self::with_clock(Instant::now)
    }

    /// Use a custom time source, e.g. a paused runtime clock.
    pub fn with_clock(clock: fn() -> Instant) -> Self {
        Self {
            deadlines: HashMap::new(),
            clock,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every channel whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<u16> {
        let mut expired: Vec<(Instant, u16)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(cid, deadline)| (*deadline, *cid))
            .collect();
        expired.sort_unstable();
        for (_, cid) in &expired {
            self.deadlines.remove(cid);
        }
        expired.into_iter().map(|(_, cid)| cid).collect()
    }

    pub fn take_expired_now(&mut self) -> Vec<u16> {
        let now = (self.clock)();
        self.take_expired(now)
    }

    pub fn is_armed(&self, cid: u16) -> bool {
        self.deadlines.contains_key(&cid)
    }
}

impl TimerService for DeadlineTimers {
    fn start(&mut self, cid: u16, timeout: Duration) {
        let deadline = (self.clock)() + timeout;
        trace!(cid, ?timeout, "timer armed");
        self.deadlines.insert(cid, deadline);
    }

    fn stop(&mut self, cid: u16) {
        if self.deadlines.remove(&cid).is_some() {
            trace!(cid, "timer disarmed");
        }
    }
}
