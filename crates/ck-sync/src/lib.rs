//! # ck-sync
//!
//! Four independent concurrency primitives:
//!
//! - [`LockFreeStack`]: Treiber stack, CAS on the head, epoch-based reclamation
//! - [`BoundedQueue`]: blocking FIFO with a capacity and close-drain shutdown
//! - [`RwLock`] / [`RawRwLock`]: reader/writer lock that holds new readers
//!   back while a writer waits
//! - [`FixedThreadPool`]: fixed workers, one [`TaskHandle`] per submission
//!
//! Each one is checked against the invariants in `ck-core` by DST runs in its
//! unit tests. The queue and the rw-lock are also modeled with loom
//! (`RUSTFLAGS="--cfg loom"`), and the sequential stack and queue contracts
//! have Kani proofs (`cfg(kani)`).

mod sync;

pub mod bounded_queue;
pub mod error;
pub mod rw_lock;
pub mod stack;
pub mod thread_pool;

#[cfg(kani)]
mod kani_proofs;

pub use bounded_queue::BoundedQueue;
pub use error::{PoolError, PushError, QueueError, TaskError};
pub use rw_lock::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use stack::LockFreeStack;
pub use thread_pool::{FixedThreadPool, PoolConfig, TaskHandle};
