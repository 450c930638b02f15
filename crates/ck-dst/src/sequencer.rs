//! Scripted interleavings of real threads.
//!
//! The simulated harness cannot drive blocking calls, and loom cannot see
//! `std` threads. For protocols like writer priority the interesting schedule
//! is small and known in advance: "W1 blocks, then R2 arrives, then the
//! reader releases". A [`Sequencer`] lets each thread wait for its turn number
//! before acting, so such a schedule can be forced on real threads.
//!
//! ```
//! use std::sync::Arc;
//! use ck_dst::Sequencer;
//!
//! let seq = Arc::new(Sequencer::new());
//! let other = Arc::clone(&seq);
//! let t = std::thread::spawn(move || other.run_turn(1, || "second"));
//! assert_eq!(seq.run_turn(0, || "first"), "first");
//! assert_eq!(t.join().unwrap(), "second");
//! assert_eq!(seq.current(), 2);
//! ```
//!
//! Turns only order the *start* of each step. When a step blocks inside the
//! structure under test, the next turn usually has to wait until that block is
//! visible; [`eventually`] polls an observer for that.

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic turn counter that threads wait on.
#[derive(Debug, Default)]
pub struct Sequencer {
    turn: Mutex<usize>,
    advanced: Condvar,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn that may run now.
    #[must_use]
    pub fn current(&self) -> usize {
        *self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until it is `turn`'s go.
    pub fn wait_turn(&self, turn: usize) {
        let mut current = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        while *current < turn {
            current = self
                .advanced
                .wait(current)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_turn`](Self::wait_turn) but gives up after `timeout`.
    /// Returns whether the turn came.
    pub fn wait_turn_timeout(&self, turn: usize, timeout: Duration) -> bool {
        let guard = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .advanced
            .wait_timeout_while(guard, timeout, |current| *current < turn)
            .unwrap_or_else(PoisonError::into_inner);
        *guard >= turn
    }

    /// Hand over to the next turn.
    pub fn advance(&self) {
        let mut current = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        self.advanced.notify_all();
    }

    /// Wait for `turn`, run `step`, then advance.
    ///
    /// The turn is advanced *after* `step` returns, so a step that blocks
    /// holds up every later turn. Use [`begin_turn`](Self::begin_turn) when
    /// the step is expected to block.
    pub fn run_turn<R>(&self, turn: usize, step: impl FnOnce() -> R) -> R {
        self.wait_turn(turn);
        let result = step();
        self.advance();
        result
    }

    /// Wait for `turn` and advance immediately, leaving the caller free to
    /// block in its next call while later turns proceed.
    pub fn begin_turn(&self, turn: usize) {
        self.wait_turn(turn);
        self.advance();
    }
}

/// Poll `condition` until it holds or `timeout` passes. Returns whether it held.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    let mut spins = 0u32;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        if spins < 64 {
            spins += 1;
            thread::yield_now();
        } else {
            thread::sleep(Duration::from_micros(200));
        }
    }
}
