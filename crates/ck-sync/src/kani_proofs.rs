//! Kani proof harnesses for the sequential behaviour of the stack and queue.
//!
//! ```bash
//! cargo kani -p ck-sync
//! cargo kani -p ck-sync --harness proof_queue_close_drains
//! ```
//!
//! Kani runs a single thread, so these cover sequential contracts only.
//! Interleavings are left to the loom models and the DST runs.

use crate::bounded_queue::BoundedQueue;
use crate::stack::LockFreeStack;

#[kani::proof]
#[kani::unwind(4)]
fn proof_stack_lifo() {
    let stack = LockFreeStack::new();
    let v1: u64 = kani::any();
    let v2: u64 = kani::any();
    kani::assume(v1 != v2);

    stack.push(v1);
    stack.push(v2);

    kani::assert(stack.pop() == Some(v2), "last pushed is popped first");
    kani::assert(stack.pop() == Some(v1), "first pushed is popped last");
    kani::assert(stack.pop().is_none(), "drained stack pops nothing");
}

#[kani::proof]
#[kani::unwind(3)]
fn proof_stack_is_empty() {
    let stack = LockFreeStack::new();
    kani::assert(stack.is_empty(), "new stack is empty");

    stack.push(kani::any::<u64>());
    kani::assert(!stack.is_empty(), "stack with an element is not empty");

    stack.pop();
    kani::assert(stack.is_empty(), "stack is empty after popping its only element");
}

/// Whatever mix of pushes and pops, no more comes out than went in.
#[kani::proof]
#[kani::unwind(8)]
fn proof_stack_pop_count_bounded() {
    let stack = LockFreeStack::new();
    let mut pushed: u64 = 0;
    let mut popped: u64 = 0;

    for _ in 0..5u8 {
        if kani::any() {
            pushed += 1;
            stack.push(pushed);
        } else if stack.pop().is_some() {
            popped += 1;
        }
    }

    kani::assert(popped <= pushed, "cannot pop more than was pushed");
    kani::assert(
        stack.snapshot().len() as u64 == pushed - popped,
        "remaining elements equal pushes minus pops",
    );
}

#[kani::proof]
fn proof_queue_zero_capacity_rejected() {
    kani::assert(
        BoundedQueue::<u8>::with_capacity(0).is_err(),
        "zero capacity is a construction error",
    );
}

#[kani::proof]
#[kani::unwind(5)]
fn proof_queue_capacity_respected() {
    let capacity: usize = kani::any();
    kani::assume(capacity > 0 && capacity <= 3);
    let Ok(queue) = BoundedQueue::with_capacity(capacity) else {
        return;
    };

    let mut accepted = 0;
    for i in 0..4u8 {
        if queue.try_push(i).is_ok() {
            accepted += 1;
        }
    }

    kani::assert(accepted == capacity, "exactly capacity pushes are accepted");
    kani::assert(queue.len() == capacity, "length never exceeds capacity");
}

#[kani::proof]
#[kani::unwind(4)]
fn proof_queue_close_drains() {
    let Ok(queue) = BoundedQueue::with_capacity(2) else {
        return;
    };
    let a: u8 = kani::any();
    let b: u8 = kani::any();
    let _ = queue.try_push(a);
    let _ = queue.try_push(b);
    queue.close();

    kani::assert(
        queue.try_push(0).is_err_and(|e| e.is_closed()),
        "push after close is rejected as closed",
    );
    kani::assert(queue.pop() == Some(a), "close keeps queued items in order");
    kani::assert(queue.pop() == Some(b), "close keeps queued items in order");
    kani::assert(queue.pop().is_none(), "drained closed queue returns none");
}
