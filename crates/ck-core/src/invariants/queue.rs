//! Bounded blocking queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | FIFO_Order | Every pop returns the model's front item |
//! | NoLostItems | No pop reports empty while items are queued; final contents match |
//! | BoundedCapacity | No push is accepted at capacity; no `Full` while space exists |
//! | ClosedRejectsPush | Nothing is accepted after close; no `Closed` before it |
//! | CloseDrain | After close, queued items are still handed out until empty |
//!
//! The replay assumes the history is in linearization order. Concurrent runs
//! record per-producer sequence numbers instead and use
//! [`check_per_producer_fifo`].

use std::collections::{HashMap, VecDeque};

use crate::counterexample::Counterexample;
use crate::property::{PropertyChecker, PropertyResult};

/// What a checker needs to see of a queue.
pub trait QueueProperties {
    /// Configured capacity limit.
    fn capacity(&self) -> usize;

    /// Items currently queued, front to back.
    fn current_contents(&self) -> Vec<u64>;

    /// Operation history in linearization order.
    fn history(&self) -> QueueHistory;
}

/// Why a push was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Full,
    Closed,
    Timeout,
}

/// One queue operation and its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    /// Push accepted
    Push(u64),
    /// Push refused; the item was handed back
    PushRejected(u64, Rejection),
    /// Pop returned an item
    Pop(u64),
    /// Pop returned nothing
    PopEmpty,
    Close,
    Clear,
}

/// A recorded queue operation.
#[derive(Debug, Clone)]
pub struct QueueOperation {
    pub thread_id: u64,
    pub op: QueueOp,
    pub step: u64,
}

/// History of queue operations.
#[derive(Debug, Clone, Default)]
pub struct QueueHistory {
    pub operations: Vec<QueueOperation>,
}

impl QueueHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation; steps are assigned consecutively.
    pub fn record(&mut self, thread_id: u64, op: QueueOp) {
        let step = self.operations.last().map_or(1, |o| o.step + 1);
        self.operations.push(QueueOperation {
            thread_id,
            op,
            step,
        });
    }
}

/// Model state while replaying.
struct Replay {
    items: VecDeque<u64>,
    closed: bool,
}

/// Property checker for bounded queue implementations.
pub struct QueuePropertyChecker<'a, T: QueueProperties> {
    queue: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: QueueProperties> QueuePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(queue: &'a T) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    /// Replay the history, handing each step and the model state *before* it
    /// to `inspect`. The first `Some` returned becomes the failure.
    fn replay<F>(&self, name: &'static str, mut inspect: F) -> PropertyResult
    where
        F: FnMut(&QueueOperation, &Replay, usize) -> Option<String>,
    {
        let history = self.queue.history();
        let capacity = self.queue.capacity();
        let mut model = Replay {
            items: VecDeque::new(),
            closed: false,
        };

        for op in &history.operations {
            if let Some(msg) = inspect(op, &model, capacity) {
                let mut ce = Counterexample::for_seed(self.dst_seed)
                    .with_description(format!("{} violated at step {}", name, op.step));
                for prior in history.operations.iter().filter(|p| p.step <= op.step) {
                    ce.record(
                        prior.thread_id,
                        prior.step,
                        describe(prior.op),
                        prior.step != op.step,
                    );
                }
                return PropertyResult::fail(name, msg, Some(ce));
            }

            match op.op {
                QueueOp::Push(v) => model.items.push_back(v),
                QueueOp::Pop(_) => {
                    model.items.pop_front();
                }
                QueueOp::Close => model.closed = true,
                QueueOp::Clear => model.items.clear(),
                QueueOp::PushRejected(..) | QueueOp::PopEmpty => {}
            }
        }

        PropertyResult::pass(name)
    }

    fn check_fifo_order(&self) -> PropertyResult {
        self.replay("FIFO_Order", |op, model, _| match op.op {
            QueueOp::Pop(v) => match model.items.front() {
                Some(&front) if front == v => None,
                Some(&front) => Some(format!("pop returned {} but model front was {}", v, front)),
                None => Some(format!("pop returned {} from an empty model", v)),
            },
            _ => None,
        })
    }

    fn check_no_lost_items(&self) -> PropertyResult {
        let replayed = self.replay("NoLostItems", |op, model, _| match op.op {
            QueueOp::PopEmpty if !model.closed && !model.items.is_empty() => Some(format!(
                "pop returned nothing while {} items were queued",
                model.items.len()
            )),
            _ => None,
        });
        if !replayed.holds {
            return replayed;
        }

        let mut expected = VecDeque::new();
        for op in &self.queue.history().operations {
            match op.op {
                QueueOp::Push(v) => expected.push_back(v),
                QueueOp::Pop(_) => {
                    expected.pop_front();
                }
                QueueOp::Clear => expected.clear(),
                _ => {}
            }
        }
        let actual = self.queue.current_contents();
        if actual.iter().ne(expected.iter()) {
            return PropertyResult::fail(
                "NoLostItems",
                format!("queue holds {:?} but history implies {:?}", actual, expected),
                None,
            );
        }
        PropertyResult::pass("NoLostItems")
    }

    fn check_bounded_capacity(&self) -> PropertyResult {
        let len = self.queue.current_contents().len();
        let capacity = self.queue.capacity();
        if len > capacity {
            return PropertyResult::fail(
                "BoundedCapacity",
                format!("queue holds {} items but capacity is {}", len, capacity),
                None,
            );
        }

        self.replay("BoundedCapacity", |op, model, capacity| match op.op {
            QueueOp::Push(v) if model.items.len() >= capacity => Some(format!(
                "push({}) accepted with {} items queued at capacity {}",
                v,
                model.items.len(),
                capacity
            )),
            QueueOp::PushRejected(v, Rejection::Full | Rejection::Timeout)
                if !model.closed && model.items.len() < capacity =>
            {
                Some(format!(
                    "push({}) refused as full with {} of {} slots used",
                    v,
                    model.items.len(),
                    capacity
                ))
            }
            _ => None,
        })
    }

    fn check_closed_rejects_push(&self) -> PropertyResult {
        self.replay("ClosedRejectsPush", |op, model, _| match op.op {
            QueueOp::Push(v) if model.closed => {
                Some(format!("push({}) accepted after close", v))
            }
            QueueOp::PushRejected(v, Rejection::Closed) if !model.closed => {
                Some(format!("push({}) refused as closed before close()", v))
            }
            _ => None,
        })
    }

    fn check_close_drain(&self) -> PropertyResult {
        self.replay("CloseDrain", |op, model, _| match op.op {
            QueueOp::PopEmpty if model.closed && !model.items.is_empty() => Some(format!(
                "pop after close returned nothing with {} items left to drain",
                model.items.len()
            )),
            _ => None,
        })
    }
}

impl<T: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_fifo_order(),
            self.check_no_lost_items(),
            self.check_bounded_capacity(),
            self.check_closed_rejects_push(),
            self.check_close_drain(),
        ]
    }
}

fn describe(op: QueueOp) -> String {
    match op {
        QueueOp::Push(v) => format!("push({})", v),
        QueueOp::PushRejected(v, why) => format!("push({})={:?}", v, why),
        QueueOp::Pop(v) => format!("pop()={}", v),
        QueueOp::PopEmpty => "pop()=None".to_string(),
        QueueOp::Close => "close()".to_string(),
        QueueOp::Clear => "clear()".to_string(),
    }
}

/// Per-producer FIFO for concurrent runs.
///
/// `consumed` lists `(producer, sequence)` pairs in the order a single
/// consumer received them. Items from one producer must arrive with strictly
/// increasing sequence numbers.
#[must_use]
pub fn check_per_producer_fifo(consumed: &[(u64, u64)]) -> PropertyResult {
    let mut last: HashMap<u64, u64> = HashMap::new();
    for (index, &(producer, seq)) in consumed.iter().enumerate() {
        if let Some(prev) = last.insert(producer, seq) {
            if seq <= prev {
                return PropertyResult::fail(
                    "PerProducerFIFO",
                    format!(
                        "producer {} item {} received after item {} (position {})",
                        producer, seq, prev, index
                    ),
                    None,
                );
            }
        }
    }
    PropertyResult::pass("PerProducerFIFO")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ModelQueue {
        capacity: usize,
        items: VecDeque<u64>,
        closed: bool,
        history: QueueHistory,
    }

    impl ModelQueue {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                items: VecDeque::new(),
                closed: false,
                history: QueueHistory::new(),
            }
        }

        fn try_push(&mut self, v: u64) {
            let op = if self.closed {
                QueueOp::PushRejected(v, Rejection::Closed)
            } else if self.items.len() >= self.capacity {
                QueueOp::PushRejected(v, Rejection::Full)
            } else {
                self.items.push_back(v);
                QueueOp::Push(v)
            };
            self.history.record(0, op);
        }

        fn try_pop(&mut self) {
            let op = self.items.pop_front().map_or(QueueOp::PopEmpty, QueueOp::Pop);
            self.history.record(1, op);
        }

        fn close(&mut self) {
            self.closed = true;
            self.history.record(0, QueueOp::Close);
        }
    }

    impl QueueProperties for ModelQueue {
        fn capacity(&self) -> usize {
            self.capacity
        }

        fn current_contents(&self) -> Vec<u64> {
            self.items.iter().copied().collect()
        }

        fn history(&self) -> QueueHistory {
            self.history.clone()
        }
    }

    #[test]
    fn test_correct_queue_passes_all() {
        let mut q = ModelQueue::new(2);
        q.try_push(1);
        q.try_push(2);
        q.try_push(3);
        q.try_pop();
        q.try_push(4);
        q.close();
        q.try_push(5);
        q.try_pop();
        q.try_pop();
        q.try_pop();

        let checker = QueuePropertyChecker::new(&q);
        assert!(checker.all_hold(), "{}", checker.report());
    }

    #[test]
    fn test_out_of_order_pop_detected() {
        let mut q = ModelQueue::new(4);
        q.try_push(1);
        q.try_push(2);
        q.history.record(1, QueueOp::Pop(2));
        q.items.pop_back();

        let results = QueuePropertyChecker::new(&q).check_all();
        let fifo = results.iter().find(|r| r.name == "FIFO_Order").unwrap();
        assert!(!fifo.holds);
        assert!(fifo.violation.as_ref().unwrap().contains("model front was 1"));
    }

    #[test]
    fn test_push_over_capacity_detected() {
        let mut q = ModelQueue::new(1);
        q.try_push(1);
        q.items.push_back(2);
        q.history.record(0, QueueOp::Push(2));

        let results = QueuePropertyChecker::new(&q).check_all();
        let bound = results.iter().find(|r| r.name == "BoundedCapacity").unwrap();
        assert!(!bound.holds);
    }

    #[test]
    fn test_close_discard_detected() {
        let mut q = ModelQueue::new(4);
        q.try_push(1);
        q.close();
        q.history.record(1, QueueOp::PopEmpty);

        let results = QueuePropertyChecker::new(&q).with_seed(5).check_all();
        let drain = results.iter().find(|r| r.name == "CloseDrain").unwrap();
        assert!(!drain.holds);
        assert!(drain
            .counterexample
            .as_ref()
            .unwrap()
            .render_diagram()
            .contains("close()"));
    }

    #[test]
    fn test_push_after_close_detected() {
        let mut q = ModelQueue::new(4);
        q.close();
        q.history.record(0, QueueOp::Push(7));
        q.items.push_back(7);

        let results = QueuePropertyChecker::new(&q).check_all();
        let closed = results.iter().find(|r| r.name == "ClosedRejectsPush").unwrap();
        assert!(!closed.holds);
    }

    #[test]
    fn test_per_producer_fifo() {
        assert!(check_per_producer_fifo(&[(0, 1), (1, 1), (0, 2), (1, 2)]).holds);
        assert!(!check_per_producer_fifo(&[(0, 2), (1, 1), (0, 1)]).holds);
    }
}
