//! Random scheduling of simulated threads.
//!
//! The harness runs every simulated thread on one OS thread and asks the
//! scheduler, at each yield point, whether to keep going or hand over.

use crate::random::DeterministicRng;

/// Outcome of a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread
    Continue,
    /// Switch to the given thread
    SwitchTo(usize),
}

/// Seeded scheduler over `threads_count` simulated threads.
#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    switch_probability: f64,
    current: usize,
    switches_count: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(rng: DeterministicRng, threads_count: usize, switch_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "scheduler needs at least one thread");
        Self {
            rng,
            threads_count,
            switch_probability,
            current: 0,
            switches_count: 0,
        }
    }

    #[must_use]
    pub fn current_thread(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    #[must_use]
    pub fn switches_count(&self) -> u64 {
        self.switches_count
    }

    /// Maybe switch to another thread.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count > 1 && self.rng.gen_bool(self.switch_probability) {
            ScheduleDecision::SwitchTo(self.switch_away())
        } else {
            ScheduleDecision::Continue
        }
    }

    /// Switch to some other thread unconditionally (current thread finished).
    pub fn force_switch(&mut self) -> usize {
        if self.threads_count > 1 {
            self.switch_away()
        } else {
            self.current
        }
    }

    fn switch_away(&mut self) -> usize {
        // Uniform over the other threads.
        let offset = self.rng.gen_range(1..self.threads_count);
        self.current = (self.current + offset) % self.threads_count;
        self.switches_count += 1;
        self.current
    }
}
