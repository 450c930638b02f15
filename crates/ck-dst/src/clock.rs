//! Simulated time.
//!
//! Time only moves when the simulation says so. Injected delays advance the
//! clock instead of sleeping, so a run with many slow operations still
//! finishes instantly and identically.

use std::time::Duration;

/// Simulated monotonic clock, nanosecond resolution.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Time since the start of the simulation.
    #[must_use]
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns)
    }

    pub fn advance_ns(&mut self, ns: u64) {
        self.now_ns = self.now_ns.saturating_add(ns);
    }

    pub fn advance_us(&mut self, us: u64) {
        self.advance_ns(us.saturating_mul(1_000));
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance_ns(ms.saturating_mul(1_000_000));
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_ns(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Whether `deadline_ns` has been reached.
    #[must_use]
    pub fn is_past(&self, deadline_ns: u64) -> bool {
        self.now_ns >= deadline_ns
    }
}
