//! Writer-priority reader/writer lock.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | MutualExclusion | loom, DST, scripted tests |
//! | WriterPriority | loom, scripted tests |
//! | BalancedRelease | DST |
//!
//! A writer announces itself (`waiting_writers += 1`) *before* it waits for
//! the lock to drain. Readers may only enter while no writer is active and
//! none is waiting, so once a writer is queued no new reader gets in ahead of
//! it. Readers among themselves are unordered and are released together.
//!
//! | Transition | Wakes |
//! |------------|-------|
//! | last reader leaves, writers waiting | one writer |
//! | writer leaves, writers waiting | one writer |
//! | writer leaves, no writers waiting | all readers |

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::sync::{lock, wait_while, Condvar, Mutex};

#[derive(Debug, Default)]
struct LockState {
    active_readers: usize,
    waiting_writers: usize,
    writer_active: bool,
}

impl LockState {
    fn readers_blocked(&self) -> bool {
        self.writer_active || self.waiting_writers > 0
    }

    fn writer_blocked(&self) -> bool {
        self.writer_active || self.active_readers > 0
    }
}

/// The lock protocol without any protected data.
///
/// Every `*_lock` must be paired with the matching `*_unlock` on the same
/// lock; [`RwLock`] does that pairing with guards.
pub struct RawRwLock {
    state: Mutex<LockState>,
    readers_ok: Condvar,
    writers_ok: Condvar,
}

impl RawRwLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            readers_ok: Condvar::new(),
            writers_ok: Condvar::new(),
        }
    }

    /// Block until no writer is active or waiting, then enter as a reader.
    pub fn read_lock(&self) {
        let guard = lock(&self.state);
        let mut state = wait_while(&self.readers_ok, guard, LockState::readers_blocked);
        state.active_readers += 1;
    }

    /// Enter as a reader only if [`read_lock`](Self::read_lock) would not block.
    pub fn try_read_lock(&self) -> bool {
        let mut state = lock(&self.state);
        if state.readers_blocked() {
            return false;
        }
        state.active_readers += 1;
        true
    }

    pub fn read_unlock(&self) {
        let mut state = lock(&self.state);
        debug_assert!(state.active_readers > 0, "read_unlock without read_lock");
        state.active_readers = state.active_readers.saturating_sub(1);
        let wake_writer = state.active_readers == 0 && state.waiting_writers > 0;
        drop(state);

        if wake_writer {
            self.writers_ok.notify_one();
        }
    }

    /// Queue as a writer (blocking new readers), then wait for exclusive access.
    pub fn write_lock(&self) {
        let mut guard = lock(&self.state);
        guard.waiting_writers += 1;
        let mut state = wait_while(&self.writers_ok, guard, LockState::writer_blocked);
        state.waiting_writers -= 1;
        state.writer_active = true;
    }

    /// Take exclusive access only if it is free right now. Does not queue.
    pub fn try_write_lock(&self) -> bool {
        let mut state = lock(&self.state);
        if state.writer_blocked() {
            return false;
        }
        state.writer_active = true;
        true
    }

    pub fn write_unlock(&self) {
        let mut state = lock(&self.state);
        debug_assert!(state.writer_active, "write_unlock without write_lock");
        state.writer_active = false;
        let writers_waiting = state.waiting_writers > 0;
        drop(state);

        if writers_waiting {
            self.writers_ok.notify_one();
        } else {
            self.readers_ok.notify_all();
        }
    }

    #[must_use]
    pub fn active_readers(&self) -> usize {
        lock(&self.state).active_readers
    }

    /// Writers blocked in [`write_lock`](Self::write_lock).
    #[must_use]
    pub fn waiting_writers(&self) -> usize {
        lock(&self.state).waiting_writers
    }

    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        lock(&self.state).writer_active
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("RawRwLock")
            .field("active_readers", &state.active_readers)
            .field("waiting_writers", &state.waiting_writers)
            .field("writer_active", &state.writer_active)
            .finish()
    }
}

/// Writer-priority reader/writer lock owning its data.
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`; readers share `&T`
// across threads, hence `T: Sync` for `Sync`.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            raw: RawRwLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Shared access; blocks while a writer is active or waiting.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.raw.read_lock();
        RwLockReadGuard { lock: self }
    }

    /// Exclusive access; new readers are held back while this waits.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.raw.write_lock();
        RwLockWriteGuard { lock: self }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.raw
            .try_read_lock()
            .then(|| RwLockReadGuard { lock: self })
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.raw
            .try_write_lock()
            .then(|| RwLockWriteGuard { lock: self })
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// No locking needed: `&mut self` proves exclusive access.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[must_use]
    pub fn active_readers(&self) -> usize {
        self.raw.active_readers()
    }

    #[must_use]
    pub fn waiting_writers(&self) -> usize {
        self.raw.waiting_writers()
    }

    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.raw.is_write_locked()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwLock");
        match self.try_read() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Shared access to an [`RwLock`]; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: a read lock is held, so no writer exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.read_unlock();
    }
}

/// Exclusive access to an [`RwLock`]; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the write lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the write lock is held and this guard is borrowed mutably.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.write_unlock();
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
