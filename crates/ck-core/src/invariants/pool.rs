//! Fixed thread pool invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | ExactlyOnce | Accepted tasks run once, rejected tasks never |
//! | DrainOnShutdown | Every accepted task ran before shutdown returned |
//! | RejectAfterShutdown | Submissions after shutdown began are refused, earlier ones are not |
//! | FailureIsolation | Each handle reports its own task's outcome, whatever its neighbours did |
//!
//! Submissions and shutdown must be recorded from one thread so that their
//! relative order is meaningful. `Ran` events come from the workers and may
//! appear before the matching `Submitted`.

use std::collections::HashMap;

use crate::counterexample::Counterexample;
use crate::property::{PropertyChecker, PropertyResult};

/// One pool event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// `submit` returned; `fails` is whether the task was written to panic.
    Submitted { task: u64, accepted: bool, fails: bool },
    /// The task body started on a worker.
    Ran { task: u64 },
    /// The submitter consumed the handle.
    Outcome { task: u64, failed: bool },
    ShutdownBegin,
    ShutdownComplete,
}

#[derive(Debug, Clone)]
pub struct PoolRecord {
    pub thread_id: u64,
    pub event: PoolEvent,
    pub step: u64,
}

/// Pool events in record order.
#[derive(Debug, Clone, Default)]
pub struct PoolHistory {
    pub events: Vec<PoolRecord>,
}

impl PoolHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, thread_id: u64, event: PoolEvent) {
        let step = self.events.last().map_or(1, |e| e.step + 1);
        self.events.push(PoolRecord {
            thread_id,
            event,
            step,
        });
    }

    fn step_of(&self, wanted: PoolEvent) -> Option<u64> {
        self.events.iter().find(|r| r.event == wanted).map(|r| r.step)
    }

    /// `(accepted, fails)` per submitted task.
    fn submissions(&self) -> HashMap<u64, (bool, bool)> {
        self.events
            .iter()
            .filter_map(|r| match r.event {
                PoolEvent::Submitted {
                    task,
                    accepted,
                    fails,
                } => Some((task, (accepted, fails))),
                _ => None,
            })
            .collect()
    }
}

/// Property checker over a recorded pool history.
pub struct PoolPropertyChecker<'a> {
    history: &'a PoolHistory,
    dst_seed: Option<u64>,
}

impl<'a> PoolPropertyChecker<'a> {
    #[must_use]
    pub fn new(history: &'a PoolHistory) -> Self {
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

    fn check_exactly_once(&self) -> PropertyResult {
        let submissions = self.history.submissions();
        let mut runs: HashMap<u64, usize> = HashMap::new();
        for r in &self.history.events {
            if let PoolEvent::Ran { task } = r.event {
                *runs.entry(task).or_default() += 1;
            }
        }
        let complete = self.history.step_of(PoolEvent::ShutdownComplete).is_some();

        let mut tasks: Vec<u64> = submissions.keys().chain(runs.keys()).copied().collect();
        tasks.sort_unstable();
        tasks.dedup();

        for task in tasks {
            let count = runs.get(&task).copied().unwrap_or(0);
            let problem = match submissions.get(&task) {
                None => Some(format!("task {} ran {} times but was never submitted", task, count)),
                Some((false, _)) if count > 0 => {
                    Some(format!("task {} was rejected but ran {} times", task, count))
                }
                Some((true, _)) if count > 1 => Some(format!("task {} ran {} times", task, count)),
                Some((true, _)) if count == 0 && complete => {
                    Some(format!("task {} was accepted but never ran", task))
                }
                _ => None,
            };
            if let Some(msg) = problem {
                return PropertyResult::fail("ExactlyOnce", msg, None);
            }
        }

        PropertyResult::pass("ExactlyOnce")
    }

    fn check_drain_on_shutdown(&self) -> PropertyResult {
        let Some(complete) = self.history.step_of(PoolEvent::ShutdownComplete) else {
            return PropertyResult::pass("DrainOnShutdown");
        };
        let submissions = self.history.submissions();

        for r in &self.history.events {
            if let PoolEvent::Ran { task } = r.event {
                if r.step > complete && submissions.get(&task).is_some_and(|s| s.0) {
                    let msg = format!("task {} ran after shutdown returned", task);
                    let mut ce = Counterexample::for_seed(self.dst_seed).with_description(msg.clone());
                    for prior in self.history.events.iter().filter(|p| p.step <= r.step) {
                        ce.record(
                            prior.thread_id,
                            prior.step,
                            format!("{:?}", prior.event),
                            prior.step != r.step,
                        );
                    }
                    return PropertyResult::fail("DrainOnShutdown", msg, Some(ce));
                }
            }
        }

        PropertyResult::pass("DrainOnShutdown")
    }

    fn check_reject_after_shutdown(&self) -> PropertyResult {
        let began = self.history.step_of(PoolEvent::ShutdownBegin);

        for r in &self.history.events {
            if let PoolEvent::Submitted { task, accepted, .. } = r.event {
                let after = began.is_some_and(|b| r.step > b);
                if after && accepted {
                    return PropertyResult::fail(
                        "RejectAfterShutdown",
                        format!("task {} accepted after shutdown began", task),
                        None,
                    );
                }
                if !after && !accepted {
                    return PropertyResult::fail(
                        "RejectAfterShutdown",
                        format!("task {} rejected before shutdown began", task),
                        None,
                    );
                }
            }
        }

        PropertyResult::pass("RejectAfterShutdown")
    }

    fn check_failure_isolation(&self) -> PropertyResult {
        let submissions = self.history.submissions();

        for r in &self.history.events {
            if let PoolEvent::Outcome { task, failed } = r.event {
                let expected = submissions.get(&task).map(|s| s.1);
                if expected != Some(failed) {
                    return PropertyResult::fail(
                        "FailureIsolation",
                        format!(
                            "task {} reported failed={} but was written with fails={:?}",
                            task, failed, expected
                        ),
                        None,
                    );
                }
            }
        }

        PropertyResult::pass("FailureIsolation")
    }
}

impl PropertyChecker for PoolPropertyChecker<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_exactly_once(),
            self.check_drain_on_shutdown(),
            self.check_reject_after_shutdown(),
            self.check_failure_isolation(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PoolEvent::*;

    fn submitted(task: u64, accepted: bool) -> PoolEvent {
        Submitted {
            task,
            accepted,
            fails: false,
        }
    }

    fn find<'a>(results: &'a [PropertyResult], name: &str) -> &'a PropertyResult {
        results.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_clean_run_passes() {
        let mut h = PoolHistory::new();
        h.record(0, submitted(1, true));
        h.record(1, Ran { task: 1 });
        h.record(0, Submitted { task: 2, accepted: true, fails: true });
        h.record(0, ShutdownBegin);
        h.record(2, Ran { task: 2 });
        h.record(0, ShutdownComplete);
        h.record(0, submitted(3, false));
        h.record(0, Outcome { task: 1, failed: false });
        h.record(0, Outcome { task: 2, failed: true });

        let checker = PoolPropertyChecker::new(&h);
        assert!(checker.all_hold(), "{}", checker.report());
    }

    #[test]
    fn test_dropped_task_detected() {
        let mut h = PoolHistory::new();
        h.record(0, submitted(1, true));
        h.record(0, submitted(2, true));
        h.record(1, Ran { task: 1 });
        h.record(0, ShutdownBegin);
        h.record(0, ShutdownComplete);

        let results = PoolPropertyChecker::new(&h).check_all();
        let once = find(&results, "ExactlyOnce");
        assert!(!once.holds);
        assert!(once.violation.as_ref().unwrap().contains("task 2"));
    }

    #[test]
    fn test_late_run_detected() {
        let mut h = PoolHistory::new();
        h.record(0, submitted(1, true));
        h.record(0, ShutdownBegin);
        h.record(0, ShutdownComplete);
        h.record(1, Ran { task: 1 });

        let results = PoolPropertyChecker::new(&h).with_seed(11).check_all();
        let drain = find(&results, "DrainOnShutdown");
        assert!(!drain.holds);
        assert!(drain.counterexample.is_some());
    }

    #[test]
    fn test_accept_after_shutdown_detected() {
        let mut h = PoolHistory::new();
        h.record(0, ShutdownBegin);
        h.record(0, submitted(1, true));

        let results = PoolPropertyChecker::new(&h).check_all();
        assert!(!find(&results, "RejectAfterShutdown").holds);
    }

    #[test]
    fn test_failure_leak_detected() {
        let mut h = PoolHistory::new();
        h.record(0, Submitted { task: 1, accepted: true, fails: true });
        h.record(0, submitted(2, true));
        h.record(1, Ran { task: 1 });
        h.record(1, Ran { task: 2 });
        h.record(0, Outcome { task: 1, failed: true });
        h.record(0, Outcome { task: 2, failed: true });

        let results = PoolPropertyChecker::new(&h).check_all();
        let isolation = find(&results, "FailureIsolation");
        assert!(!isolation.holds);
        assert!(isolation.violation.as_ref().unwrap().contains("task 2"));
    }
}
