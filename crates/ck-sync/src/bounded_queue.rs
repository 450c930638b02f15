//! Bounded blocking FIFO queue with close-drain shutdown.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | FIFO_Order | DST, proptest, kani |
//! | BoundedCapacity | DST, proptest, kani |
//! | ClosedRejectsPush | DST, loom |
//! | CloseDrain | DST, loom |
//!
//! One mutex guards the items and the closed flag. Producers wait on
//! `not_full`, consumers on `not_empty`, each re-checking its predicate under
//! the lock after every wakeup.
//!
//! Every operation comes in three flavours: blocking (`push`/`pop`),
//! non-blocking (`try_push`/`try_pop`) and timed (`*_for` with a `Duration`,
//! `*_until` with an `Instant`). A timed call that runs out of time leaves the
//! queue untouched.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{PushError, QueueError};
use crate::sync::{lock, wait_while, wait_while_until, Condvar, Mutex};

/// Capacity-limited multi-producer, multi-consumer FIFO queue.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Effectively unbounded queue (capacity `usize::MAX`).
    #[must_use]
    pub fn new() -> Self {
        Self::build(usize::MAX)
    }

    /// Queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn is_full(&self, state: &State<T>) -> bool {
        state.items.len() >= self.capacity
    }

    /// Append `value`, waiting for space.
    ///
    /// Fails with [`PushError::Closed`] if the queue is closed before space
    /// frees up; the value is never enqueued in that case.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let guard = lock(&self.state);
        let mut state = wait_while(&self.not_full, guard, |s| !s.closed && self.is_full(s));
        if state.closed {
            return Err(PushError::Closed(value));
        }
        state.items.push_back(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append `value` only if there is space right now.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(PushError::Closed(value));
        }
        if self.is_full(&state) {
            return Err(PushError::Full(value));
        }
        state.items.push_back(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Like [`push`](Self::push), giving up with [`PushError::Timeout`]
    /// after `timeout`.
    pub fn try_push_for(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_push_until(value, deadline),
            None => self.push(value),
        }
    }

    /// Like [`push`](Self::push), giving up with [`PushError::Timeout`] at
    /// `deadline`.
    pub fn try_push_until(&self, value: T, deadline: Instant) -> Result<(), PushError<T>> {
        let guard = lock(&self.state);
        let (mut state, timed_out) = wait_while_until(&self.not_full, guard, deadline, |s| {
            !s.closed && self.is_full(s)
        });
        if state.closed {
            return Err(PushError::Closed(value));
        }
        if timed_out {
            return Err(PushError::Timeout(value));
        }
        state.items.push_back(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting for one.
    ///
    /// Returns `None` only once the queue is closed *and* drained.
    pub fn pop(&self) -> Option<T> {
        let guard = lock(&self.state);
        let mut state = wait_while(&self.not_empty, guard, |s| !s.closed && s.items.is_empty());
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Remove the oldest item if there is one right now.
    pub fn try_pop(&self) -> Option<T> {
        let item = lock(&self.state).items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Like [`pop`](Self::pop), giving up after `timeout`.
    pub fn try_pop_for(&self, timeout: Duration) -> Option<T> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_pop_until(deadline),
            None => self.pop(),
        }
    }

    /// Like [`pop`](Self::pop), giving up at `deadline`.
    pub fn try_pop_until(&self, deadline: Instant) -> Option<T> {
        let guard = lock(&self.state);
        let (mut state, _) = wait_while_until(&self.not_empty, guard, deadline, |s| {
            !s.closed && s.items.is_empty()
        });
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Stop accepting items and wake every waiter. Idempotent.
    ///
    /// Items already queued stay poppable until the queue is empty.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        state.closed = true;
        let remaining = state.items.len();
        drop(state);

        debug!(remaining, "queue closed");
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Discard every queued item and wake blocked producers.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        let discarded = state.items.len();
        state.items.clear();
        drop(state);

        trace!(discarded, "queue cleared");
        self.not_full.notify_all();
    }

    /// Snapshot of the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.state).items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clone out the queued items, front to back.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.state).items.iter().cloned().collect()
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
