//! Error types.
//!
//! Empty results (popping an empty stack or a drained queue) are `None`, not
//! errors. Only lifecycle violations and task failures are reported here.

use std::fmt;
use std::io;

use thiserror::Error;

/// Construction errors for [`BoundedQueue`](crate::BoundedQueue).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}

/// A push that did not enqueue. The value is handed back.
#[derive(Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// No space, and the caller asked not to wait.
    #[error("queue is full")]
    Full(T),
    /// The queue was closed before space became available.
    #[error("queue is closed")]
    Closed(T),
    /// The deadline passed before space became available.
    #[error("timed out waiting for queue space")]
    Timeout(T),
}

impl<T> PushError<T> {
    /// Recover the value that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(v) | Self::Closed(v) | Self::Timeout(v) => v,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

// Manual so that `T` need not be `Debug`.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full(_) => "Full",
            Self::Closed(_) => "Closed",
            Self::Timeout(_) => "Timeout",
        };
        write!(f, "{}(..)", name)
    }
}

/// Errors from [`FixedThreadPool`](crate::FixedThreadPool).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool needs at least one worker")]
    ZeroWorkers,

    #[error("thread pool is shutting down")]
    ShuttingDown,

    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}

/// Why a [`TaskHandle`](crate::TaskHandle) has no value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {message}")]
    Panicked { message: String },

    #[error("task was dropped before it ran")]
    Canceled,
}
