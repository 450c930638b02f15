//! Mutex/Condvar facade shared by the blocking primitives.
//!
//! Under `--cfg loom` the queue and the rw-lock run on loom's `Mutex` and
//! `Condvar`, so loom can explore every interleaving of their wait/notify
//! protocols. Otherwise they use `std::sync`.
//!
//! Poisoning is ignored: no critical section in this crate runs user code,
//! so a poisoned lock still guards consistent state.

use std::sync::PoisonError;
use std::time::Instant;

#[cfg(loom)]
pub(crate) use loom::sync::{Condvar, Mutex, MutexGuard};
#[cfg(not(loom))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait on `cv` while `blocked` holds.
pub(crate) fn wait_while<'a, T, F>(cv: &Condvar, mut guard: MutexGuard<'a, T>, mut blocked: F) -> MutexGuard<'a, T>
where
    F: FnMut(&T) -> bool,
{
    while blocked(&*guard) {
        guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
    }
    guard
}

/// Wait on `cv` while `blocked` holds, giving up at `deadline`.
///
/// Returns the guard and whether the wait gave up. The predicate is checked
/// before the deadline, so a wakeup that arrives late still succeeds.
#[cfg(not(loom))]
pub(crate) fn wait_while_until<'a, T, F>(
    cv: &Condvar,
    mut guard: MutexGuard<'a, T>,
    deadline: Instant,
    mut blocked: F,
) -> (MutexGuard<'a, T>, bool)
where
    F: FnMut(&T) -> bool,
{
    while blocked(&*guard) {
        let now = Instant::now();
        if now >= deadline {
            return (guard, true);
        }
        let (next, _) = cv
            .wait_timeout(guard, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
        guard = next;
    }
    (guard, false)
}

/// Loom has no clock: a timed wait is a single check.
#[cfg(loom)]
pub(crate) fn wait_while_until<'a, T, F>(
    _cv: &Condvar,
    guard: MutexGuard<'a, T>,
    _deadline: Instant,
    mut blocked: F,
) -> (MutexGuard<'a, T>, bool)
where
    F: FnMut(&T) -> bool,
{
    let gave_up = blocked(&*guard);
    (guard, gave_up)
}
