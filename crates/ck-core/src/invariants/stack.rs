//! Stack invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element is in the stack or was popped |
//! | NoDuplicates | No element is popped twice, or popped and still present |
//! | NoPhantoms | Nothing is popped or present that was never pushed |
//! | LIFO_Order | Replaying the history on a `Vec` yields the same pops |
//!
//! The first three are set properties and hold under any interleaving. The
//! LIFO replay needs a history in linearization order, which only
//! single-threaded or scripted runs can provide.

use std::collections::{HashMap, HashSet};

use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// What a checker needs to see of a stack.
pub trait StackProperties {
    /// Set of all elements that have been pushed.
    fn pushed_elements(&self) -> HashSet<u64>;

    /// Every successful pop, in the order observed (duplicates kept).
    fn popped_elements(&self) -> Vec<u64>;

    /// Current contents of the stack (top to bottom).
    fn current_contents(&self) -> Vec<u64>;

    /// Operation history for LIFO order checking.
    fn history(&self) -> StackHistory;
}

/// History of stack operations in linearization order.
#[derive(Debug, Clone, Default)]
pub struct StackHistory {
    /// Recorded operations, oldest first
    pub operations: Vec<StackOperation>,
}

/// A single stack operation.
#[derive(Debug, Clone)]
pub struct StackOperation {
    /// Thread that performed the operation
    pub thread_id: u64,
    /// Type of operation
    pub op_type: StackOpType,
    /// Element pushed, or element returned by pop
    pub element: Option<u64>,
    /// Step number for ordering
    pub step: u64,
}

/// Type of stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOpType {
    Push,
    Pop,
    PopEmpty,
}

impl StackHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_step(&self) -> u64 {
        self.operations.last().map_or(1, |op| op.step + 1)
    }

    /// Record a push.
    pub fn record_push(&mut self, thread_id: u64, element: u64) {
        let step = self.next_step();
        self.operations.push(StackOperation {
            thread_id,
            op_type: StackOpType::Push,
            element: Some(element),
            step,
        });
    }

    /// Record a pop and what it returned.
    pub fn record_pop(&mut self, thread_id: u64, element: Option<u64>) {
        let step = self.next_step();
        self.operations.push(StackOperation {
            thread_id,
            op_type: if element.is_some() {
                StackOpType::Pop
            } else {
                StackOpType::PopEmpty
            },
            element,
            step,
        });
    }
}

/// Property checker for stack implementations.
pub struct StackPropertyChecker<'a, T: StackProperties> {
    stack: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: StackProperties> StackPropertyChecker<'a, T> {
    /// Create a new checker for the given stack.
    #[must_use]
    pub fn new(stack: &'a T) -> Self {
        Self {
            stack,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn check_no_lost_elements(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let popped: HashSet<u64> = self.stack.popped_elements().into_iter().collect();
        let contents: HashSet<u64> = self.stack.current_contents().into_iter().collect();

        let mut lost: Vec<u64> = pushed
            .iter()
            .filter(|e| !contents.contains(e) && !popped.contains(e))
            .copied()
            .collect();
        if lost.is_empty() {
            return PropertyResult::pass("NoLostElements");
        }
        lost.sort_unstable();

        let mut ce = Counterexample::for_seed(self.dst_seed);
        ce.add_state(StateSnapshot {
            step: 1,
            description: format!("Elements {:?} lost", lost),
            variables: vec![
                ("pushed".to_string(), pushed.len().to_string()),
                ("popped".to_string(), popped.len().to_string()),
                ("contents".to_string(), format!("{:?}", contents)),
            ],
        });
        PropertyResult::fail(
            "NoLostElements",
            format!(
                "Element {} was pushed but is neither in stack nor popped ({} lost in total)",
                lost[0],
                lost.len()
            ),
            Some(ce),
        )
    }

    fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen: HashMap<u64, &'static str> = HashMap::new();
        let popped = self.stack.popped_elements();
        let contents = self.stack.current_contents();

        for (element, place) in popped
            .iter()
            .map(|e| (*e, "popped"))
            .chain(contents.iter().map(|e| (*e, "in stack")))
        {
            if let Some(first) = seen.insert(element, place) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Element {} seen twice ({} and {})", element, first, place),
                    None,
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    fn check_no_phantoms(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let phantom = self
            .stack
            .popped_elements()
            .into_iter()
            .chain(self.stack.current_contents())
            .find(|e| !pushed.contains(e));

        match phantom {
            Some(element) => PropertyResult::fail(
                "NoPhantoms",
                format!("Element {} observed but never pushed", element),
                None,
            ),
            None => PropertyResult::pass("NoPhantoms"),
        }
    }

    /// Replay the history on a model `Vec` and compare every pop.
    fn check_lifo_order(&self) -> PropertyResult {
        let history = self.stack.history();
        let mut model: Vec<u64> = Vec::new();

        for op in &history.operations {
            let mismatch = match op.op_type {
                StackOpType::Push => {
                    model.extend(op.element);
                    None
                }
                StackOpType::Pop => match (model.pop(), op.element) {
                    (Some(expected), Some(actual)) if expected == actual => None,
                    (Some(expected), actual) => Some(format!(
                        "pop returned {:?} but model expected {}",
                        actual, expected
                    )),
                    (None, actual) => {
                        Some(format!("pop returned {:?} but model stack was empty", actual))
                    }
                },
                StackOpType::PopEmpty if !model.is_empty() => Some(format!(
                    "pop returned None but model has {} elements",
                    model.len()
                )),
                StackOpType::PopEmpty => None,
            };

            if let Some(msg) = mismatch {
                let mut ce = Counterexample::for_seed(self.dst_seed);
                for prior in history.operations.iter().filter(|p| p.step <= op.step) {
                    let action = match prior.op_type {
                        StackOpType::Push => format!("push({})", prior.element.unwrap_or(0)),
                        StackOpType::Pop => format!("pop()={}", prior.element.unwrap_or(0)),
                        StackOpType::PopEmpty => "pop()=None".to_string(),
                    };
                    ce.record(prior.thread_id, prior.step, action, prior.step != op.step);
                }
                return PropertyResult::fail(
                    "LIFO_Order",
                    format!("LIFO violated at step {}: {}", op.step, msg),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("LIFO_Order")
    }
}

impl<T: StackProperties> PropertyChecker for StackPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_no_phantoms(),
            self.check_lifo_order(),
        ]
    }
}
