//! Invariant checkers, one module per primitive.
//!
//! - `stack`: lock-free stack (NoLostElements, NoDuplicates, NoPhantoms, LIFO_Order)
//! - `queue`: bounded blocking queue (FIFO_Order, NoLostItems, BoundedCapacity,
//!   ClosedRejectsPush, CloseDrain)
//! - `rwlock`: writer-priority lock (MutualExclusion, WriterPriority, BalancedRelease)
//! - `pool`: fixed thread pool (ExactlyOnce, DrainOnShutdown, RejectAfterShutdown,
//!   FailureIsolation)

pub mod pool;
pub mod queue;
pub mod rwlock;
pub mod stack;

pub use pool::{PoolEvent, PoolHistory, PoolPropertyChecker};
pub use queue::{
    check_per_producer_fifo, QueueHistory, QueueOp, QueueProperties, QueuePropertyChecker,
    Rejection,
};
pub use rwlock::{LockEvent, RwLockHistory, RwLockPropertyChecker};
pub use stack::{StackHistory, StackOpType, StackOperation, StackProperties, StackPropertyChecker};
