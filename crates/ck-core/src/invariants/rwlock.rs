//! Writer-priority reader/writer lock invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | MutualExclusion | A writer never overlaps another writer or any reader |
//! | WriterPriority | A reader that asks while a writer waits acquires after that writer |
//! | BalancedRelease | Every release matches a held acquisition; nothing is held at the end |
//!
//! Acquisitions must be recorded while the lock is held and releases before it
//! is given up, so the history order matches the lock's own order. A writer's
//! request is only meaningful once the lock can see it waiting; scripted tests
//! record `WriteRequest` after observing `waiting_writers()` go up.

use std::collections::{HashMap, HashSet};

use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// One lock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    ReadRequest,
    ReadAcquire,
    ReadRelease,
    WriteRequest,
    WriteAcquire,
    WriteRelease,
}

impl LockEvent {
    fn label(self) -> &'static str {
        match self {
            Self::ReadRequest => "read_lock() ..",
            Self::ReadAcquire => "read_lock() ok",
            Self::ReadRelease => "read_unlock()",
            Self::WriteRequest => "write_lock() ..",
            Self::WriteAcquire => "write_lock() ok",
            Self::WriteRelease => "write_unlock()",
        }
    }
}

/// A recorded lock event.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub thread_id: u64,
    pub event: LockEvent,
    pub step: u64,
}

/// Lock events in the order the lock observed them.
#[derive(Debug, Clone, Default)]
pub struct RwLockHistory {
    pub events: Vec<LockRecord>,
}

impl RwLockHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, thread_id: u64, event: LockEvent) {
        let step = self.events.last().map_or(1, |e| e.step + 1);
        self.events.push(LockRecord {
            thread_id,
            event,
            step,
        });
    }

    /// Threads in the order they acquired, as `(thread, event)` pairs.
    #[must_use]
    pub fn acquisition_order(&self) -> Vec<(u64, LockEvent)> {
        self.events
            .iter()
            .filter(|r| matches!(r.event, LockEvent::ReadAcquire | LockEvent::WriteAcquire))
            .map(|r| (r.thread_id, r.event))
            .collect()
    }
}

/// Property checker over a recorded lock history.
pub struct RwLockPropertyChecker<'a> {
    history: &'a RwLockHistory,
    dst_seed: Option<u64>,
}

impl<'a> RwLockPropertyChecker<'a> {
    #[must_use]
    pub fn new(history: &'a RwLockHistory) -> Self {
        Self {
            history,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self, upto: u64, description: String) -> Counterexample {
        let mut ce = Counterexample::for_seed(self.dst_seed).with_description(description);
        for r in self.history.events.iter().filter(|r| r.step <= upto) {
            ce.record(r.thread_id, r.step, r.event.label(), r.step != upto);
        }
        ce
    }

    fn check_mutual_exclusion(&self) -> PropertyResult {
        let mut readers: HashSet<u64> = HashSet::new();
        let mut writer: Option<u64> = None;

        for r in &self.history.events {
            let clash = match r.event {
                LockEvent::ReadAcquire => writer.map(|w| format!(
                    "thread {} acquired read while thread {} holds write",
                    r.thread_id, w
                )),
                LockEvent::WriteAcquire => match (writer, readers.len()) {
                    (Some(w), _) => Some(format!(
                        "thread {} acquired write while thread {} holds write",
                        r.thread_id, w
                    )),
                    (None, n) if n > 0 => Some(format!(
                        "thread {} acquired write while {} readers are active",
                        r.thread_id, n
                    )),
                    _ => None,
                },
                _ => None,
            };

            if let Some(msg) = clash {
                let mut ce = self.counterexample(r.step, msg.clone());
                ce.add_state(StateSnapshot {
                    step: r.step,
                    description: format!("readers={} writer={:?}", readers.len(), writer),
                    variables: vec![],
                });
                return PropertyResult::fail("MutualExclusion", msg, Some(ce));
            }

            match r.event {
                LockEvent::ReadAcquire => {
                    readers.insert(r.thread_id);
                }
                LockEvent::ReadRelease => {
                    readers.remove(&r.thread_id);
                }
                LockEvent::WriteAcquire => writer = Some(r.thread_id),
                LockEvent::WriteRelease => writer = None,
                LockEvent::ReadRequest | LockEvent::WriteRequest => {}
            }
        }

        PropertyResult::pass("MutualExclusion")
    }

    fn check_writer_priority(&self) -> PropertyResult {
        // Writers that have asked but not yet acquired.
        let mut waiting: Vec<u64> = Vec::new();
        // Reader -> writers that were waiting when it asked.
        let mut blocked_by: HashMap<u64, Vec<u64>> = HashMap::new();

        for r in &self.history.events {
            match r.event {
                LockEvent::WriteRequest => waiting.push(r.thread_id),
                LockEvent::WriteAcquire => {
                    waiting.retain(|w| *w != r.thread_id);
                    for writers in blocked_by.values_mut() {
                        writers.retain(|w| *w != r.thread_id);
                    }
                }
                LockEvent::ReadRequest => {
                    blocked_by.insert(r.thread_id, waiting.clone());
                }
                LockEvent::ReadAcquire => {
                    if let Some(writers) = blocked_by.remove(&r.thread_id) {
                        if let Some(w) = writers.first() {
                            let msg = format!(
                                "reader {} acquired ahead of writer {} that was waiting when it asked",
                                r.thread_id, w
                            );
                            let ce = self.counterexample(r.step, msg.clone());
                            return PropertyResult::fail("WriterPriority", msg, Some(ce));
                        }
                    }
                }
                LockEvent::ReadRelease | LockEvent::WriteRelease => {}
            }
        }

        PropertyResult::pass("WriterPriority")
    }

    fn check_balanced_release(&self) -> PropertyResult {
        let mut readers: HashSet<u64> = HashSet::new();
        let mut writer: Option<u64> = None;

        for r in &self.history.events {
            let unmatched = match r.event {
                LockEvent::ReadAcquire => {
                    readers.insert(r.thread_id);
                    false
                }
                LockEvent::WriteAcquire => {
                    writer = Some(r.thread_id);
                    false
                }
                LockEvent::ReadRelease => !readers.remove(&r.thread_id),
                LockEvent::WriteRelease => writer.take() != Some(r.thread_id),
                LockEvent::ReadRequest | LockEvent::WriteRequest => false,
            };
            if unmatched {
                let msg = format!(
                    "thread {} released without holding the lock ({})",
                    r.thread_id,
                    r.event.label()
                );
                let ce = self.counterexample(r.step, msg.clone());
                return PropertyResult::fail("BalancedRelease", msg, Some(ce));
            }
        }

        if let Some(w) = writer {
            return PropertyResult::fail(
                "BalancedRelease",
                format!("thread {} still holds write at end of history", w),
                None,
            );
        }
        if let Some(reader) = readers.iter().min() {
            return PropertyResult::fail(
                "BalancedRelease",
                format!(
                    "thread {} still holds read at end of history ({} readers left)",
                    reader,
                    readers.len()
                ),
                None,
            );
        }

        PropertyResult::pass("BalancedRelease")
    }
}

impl PropertyChecker for RwLockPropertyChecker<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_mutual_exclusion(),
            self.check_writer_priority(),
            self.check_balanced_release(),
        ]
    }
}
