//! Lock-free Treiber stack.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, stress tests |
//! | NoDuplicates | DST, stress tests |
//! | LIFO_Order | DST, proptest, kani |
//! | ABA_Safety | epoch GC |
//!
//! # Memory ordering
//!
//! | Access | Ordering |
//! |--------|----------|
//! | head load | Acquire |
//! | push CAS | Release on success, Acquire on failure |
//! | pop CAS | AcqRel on success, Acquire on failure |
//!
//! # Memory safety
//!
//! Several threads can hold the same old head while their CAS attempts race.
//! Nodes are therefore reclaimed through crossbeam-epoch: a popped node is
//! only freed once every thread that was pinned when it was unlinked has
//! unpinned. This also rules out ABA, since an address cannot be reused while
//! anyone might still compare against it.
//!
//! # Progress
//!
//! Lock-free, not wait-free. A failed CAS spins through
//! `crossbeam_utils::Backoff` before retrying; there is no retry limit.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::Backoff;

/// A multi-producer, multi-consumer unbounded stack.
pub struct LockFreeStack<T> {
    head: Atomic<Node<T>>,
}

struct Node<T> {
    /// Moved out with `ptr::read` by the pop that unlinks the node; the node
    /// itself is freed later by the epoch collector without dropping it again.
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

impl<T> LockFreeStack<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    /// Push a value. Never blocks.
    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // Not yet published, so a relaxed store is enough.
            node.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Acquire, &guard)
            {
                Ok(_) => return,
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Pop the most recently pushed value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // Safety: the guard keeps any node reachable from head alive.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Relaxed, &guard);

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, &guard)
                .is_ok()
            {
                // Safety: the CAS unlinked `head`, so this thread alone moves
                // the value out and schedules the node for destruction.
                // `Node` never drops `value`, so the value is dropped once.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(ManuallyDrop::into_inner(ptr::read(&node.value)));
                }
            }
            backoff.spin();
        }
    }

    /// Point-in-time emptiness check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Copy out the current contents, top to bottom.
    ///
    /// Not linearizable with concurrent pushes and pops; meant for quiescent
    /// inspection in tests. `T: Copy` keeps it sound when a concurrent pop
    /// moves a value out of a node this walk is still reading.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Copy,
    {
        let guard = epoch::pin();
        let mut out = Vec::new();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        // Safety: pinned, so every node reached here stays allocated.
        while let Some(node) = unsafe { current.as_ref() } {
            out.push(*node.value);
            current = node.next.load(Ordering::Acquire, &guard);
        }
        out
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        // Safety: `&mut self` means no other thread can reach these nodes.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let mut node = current.into_owned();
                current = node.next.load(Ordering::Relaxed, guard);
                ManuallyDrop::drop(&mut node.value);
            }
        }
    }
}

// Safety: values move between threads through push/pop but are never shared.
unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use ck_core::invariants::{StackHistory, StackProperties, StackPropertyChecker};
    use ck_core::PropertyChecker;
    use ck_dst::{
        generate_stack_steps, get_iterations, get_or_generate_seed, run_stack_scenario, DstEnv,
        DstTestableStack, FaultConfig,
    };

    impl DstTestableStack for LockFreeStack<u64> {
        fn new() -> Self {
            LockFreeStack::new()
        }
        fn push(&self, value: u64) {
            LockFreeStack::push(self, value);
        }
        fn pop(&self) -> Option<u64> {
            LockFreeStack::pop(self)
        }
        fn is_empty(&self) -> bool {
            LockFreeStack::is_empty(self)
        }
        fn contents(&self) -> Vec<u64> {
            self.snapshot()
        }
    }

    /// Stack plus the bookkeeping the checker needs.
    struct Tracked {
        stack: LockFreeStack<u64>,
        pushed: HashSet<u64>,
        popped: Vec<u64>,
        history: StackHistory,
    }

    impl Tracked {
        fn new() -> Self {
            Self {
                stack: LockFreeStack::new(),
                pushed: HashSet::new(),
                popped: Vec::new(),
                history: StackHistory::new(),
            }
        }

        fn push(&mut self, value: u64) {
            self.stack.push(value);
            self.pushed.insert(value);
            self.history.record_push(0, value);
        }

        fn pop(&mut self) -> Option<u64> {
            let value = self.stack.pop();
            self.popped.extend(value);
            self.history.record_pop(0, value);
            value
        }
    }

    impl StackProperties for Tracked {
        fn pushed_elements(&self) -> HashSet<u64> {
            self.pushed.clone()
        }
        fn popped_elements(&self) -> Vec<u64> {
            self.popped.clone()
        }
        fn current_contents(&self) -> Vec<u64> {
            self.stack.snapshot()
        }
        fn history(&self) -> StackHistory {
            self.history.clone()
        }
    }

    /// Counts drops so leaks and double drops show up.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_basic_push_pop() {
        let stack = LockFreeStack::new();
        assert!(stack.is_empty());

        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert!(!stack.is_empty());

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_empty_is_none() {
        let stack: LockFreeStack<String> = LockFreeStack::default();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_snapshot_top_to_bottom() {
        let stack = LockFreeStack::new();
        for i in 1..=4_u32 {
            stack.push(i);
        }
        assert_eq!(stack.snapshot(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_owned_values_move_through() {
        let stack = LockFreeStack::new();
        stack.push(String::from("a"));
        stack.push(String::from("b"));
        assert_eq!(stack.pop().as_deref(), Some("b"));
        assert_eq!(stack.pop().as_deref(), Some("a"));
    }

    #[test]
    fn test_drop_releases_remaining_values_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let stack = LockFreeStack::new();
            for _ in 0..10 {
                stack.push(DropCounter(Arc::clone(&drops)));
            }
            // Popped values are dropped by the caller, the rest by the stack.
            drop(stack.pop());
            drop(stack.pop());
            assert_eq!(drops.load(Ordering::SeqCst), 2);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_invariants_basic() {
        let mut stack = Tracked::new();
        stack.push(1);
        stack.push(2);
        stack.pop();

        let checker = StackPropertyChecker::new(&stack);
        assert!(checker.all_hold(), "{}", checker.report());
    }

    #[test]
    fn test_dst_single_threaded() {
        let seed = get_or_generate_seed();
        let mut env = DstEnv::with_fault_config(seed, FaultConfig::none());
        let mut stack = Tracked::new();
        let mut next = 1_u64;

        for _ in 0..get_iterations(1000) {
            match env.rng().gen_range(0..3_u8) {
                0 => {
                    stack.push(next);
                    next += 1;
                }
                1 => {
                    stack.pop();
                }
                _ => {
                    let checker = StackPropertyChecker::new(&stack).with_seed(seed);
                    assert!(checker.all_hold(), "{}\n{}", env.format_seed(), checker.report());
                }
            }
        }

        let checker = StackPropertyChecker::new(&stack).with_seed(seed);
        assert!(checker.all_hold(), "{}\n{}", env.format_seed(), checker.report());
    }

    #[test]
    fn test_dst_with_faults() {
        let seed = get_or_generate_seed();
        let mut env = DstEnv::new(seed);
        let steps = generate_stack_steps(env.rng(), get_iterations(1000) as usize);

        let result = run_stack_scenario::<LockFreeStack<u64>>(seed, FaultConfig::aggressive(), &steps);
        assert!(result.passed(), "{}", result.format());
        println!("DST with faults completed: {}", result.stats.format());
    }

    #[test]
    fn test_concurrent_no_loss_no_duplicates() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 2_000;
        const CONSUMERS: usize = 4;

        let stack = Arc::new(LockFreeStack::new());
        let total = (PRODUCERS * PER_PRODUCER) as usize;
        let popped = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        stack.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let stack = Arc::clone(&stack);
                let popped = Arc::clone(&popped);
                thread::spawn(move || loop {
                    if popped.lock().unwrap().len() >= total {
                        break;
                    }
                    match stack.pop() {
                        Some(v) => popped.lock().unwrap().push(v),
                        None => thread::yield_now(),
                    }
                })
            })
            .collect();

        for h in producers.into_iter().chain(consumers) {
            h.join().unwrap();
        }

        let mut popped = popped.lock().unwrap().clone();
        popped.sort_unstable();
        let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(popped, expected);
        assert!(stack.is_empty());
    }
}
