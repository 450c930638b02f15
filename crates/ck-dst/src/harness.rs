//! DST harness for reproducible simulated-concurrency tests.
//!
//! Simulated threads are interleaved on the calling OS thread at operation
//! granularity, so only non-blocking operations (`try_*`) can be driven from
//! here. Blocking protocols are covered by loom models and by the
//! [`Sequencer`](crate::Sequencer) instead.
//!
//! Because the whole run happens on one thread, the order in which operations
//! execute *is* their linearization order, and histories recorded inside the
//! `execute` callback can be replayed by the `ck-core` checkers as-is.

use ck_core::PropertyResult;

use crate::{DstEnv, FaultConfig};

/// Configuration for a harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of simulated threads
    pub threads_count: usize,
    /// Operations each simulated thread performs
    pub operations_per_thread: u64,
    /// Probability of a context switch at each yield point
    pub yield_probability: f64,
    pub fault_config: FaultConfig,
    /// Run the invariant callback every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }
}

/// Outcome of a harness run.
#[derive(Debug, Clone)]
pub struct HarnessResult {
    pub seed: u64,
    pub operations_count: u64,
    pub context_switches_count: u64,
    pub faults_injected_count: u64,
    pub invariant_checks_count: u64,
    pub all_invariants_held: bool,
    pub first_violation: Option<String>,
}

impl HarnessResult {
    /// One line, plus the violation if there was one.
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held {
            "PASS"
        } else {
            "FAIL"
        };

        let mut result = format!(
            "[{}] DST_SEED={} ops={} switches={} faults={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        );
        if let Some(ref violation) = self.first_violation {
            result.push_str("\n  Violation: ");
            result.push_str(violation);
        }
        result
    }
}

/// Deterministic harness: same seed, same interleaving, same faults.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: u64,
    invariant_checks_count: u64,
    violation: Option<String>,
}

impl DstHarness {
    #[must_use]
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(config.threads_count > 0, "Must have at least one thread");
        debug_assert!(
            config.threads_count <= 16,
            "Too many threads for DST: {}",
            config.threads_count
        );

        let env = DstEnv::with_fault_config(seed, config.fault_config.clone())
            .scheduled(config.threads_count, config.yield_probability);

        Self {
            env,
            config,
            operations_count: 0,
            invariant_checks_count: 0,
            violation: None,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.violation.is_some()
    }

    /// Record a violation; only the first one is kept.
    pub fn stop_with_violation(&mut self, message: String) {
        if self.violation.is_none() {
            self.violation = Some(message);
        }
    }

    fn due_for_check(&self) -> bool {
        self.config.invariant_check_interval != 0
            && self.operations_count % self.config.invariant_check_interval == 0
    }

    fn run_checks<I>(&mut self, check_invariants: &mut I)
    where
        I: FnMut() -> Vec<PropertyResult>,
    {
        self.invariant_checks_count += 1;
        if let Some(failed) = check_invariants().into_iter().find(|r| !r.holds) {
            let message = format!("after {} ops: {}", self.operations_count, failed);
            self.stop_with_violation(message);
        }
    }

    /// Run one simulated thread.
    ///
    /// `generate_op` is called once per step and may return `None` to skip it.
    pub fn run_single_threaded<F, T, R>(&mut self, mut generate_op: F, mut execute: R) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, T) -> Result<(), String>,
    {
        for step in 0..self.config.operations_per_thread {
            if self.is_stopped() {
                break;
            }
            if let Some(op) = generate_op(&mut self.env, step) {
                if let Err(e) = execute(&mut self.env, op) {
                    self.stop_with_violation(format!("step {}: {}", step, e));
                    break;
                }
                self.operations_count += 1;
            }
            self.env.maybe_delay();
        }

        self.build_result()
    }

    /// Run `threads_count` simulated threads, interleaved by the scheduler.
    ///
    /// `check_invariants` runs every `invariant_check_interval` operations and
    /// once more at the end.
    pub fn run_concurrent<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<(), String>,
        I: FnMut() -> Vec<PropertyResult>,
    {
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps: Vec<u64> = vec![0; self.config.threads_count];

        while !self.is_stopped() {
            let current = self.env.scheduler().map_or(0, |s| s.current_thread());

            if thread_steps[current] >= ops_per_thread {
                if thread_steps.iter().all(|&s| s >= ops_per_thread) {
                    break;
                }
                if let Some(scheduler) = self.env.scheduler() {
                    scheduler.force_switch();
                }
                continue;
            }

            if let Some(op) = generate_op(&mut self.env, current, thread_steps[current]) {
                if let Err(e) = execute(&mut self.env, current, op) {
                    self.stop_with_violation(format!("thread {}: {}", current, e));
                    break;
                }
                self.operations_count += 1;
                if self.due_for_check() {
                    self.run_checks(&mut check_invariants);
                }
            }
            thread_steps[current] += 1;

            self.env.maybe_delay();
            if let Some(scheduler) = self.env.scheduler() {
                scheduler.decide();
            }
        }

        if !self.is_stopped() {
            self.run_checks(&mut check_invariants);
        }

        self.build_result()
    }

    fn build_result(&mut self) -> HarnessResult {
        HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            context_switches_count: self.env.scheduler().map_or(0, |s| s.switches_count()),
            faults_injected_count: self.env.stats().faults_count,
            invariant_checks_count: self.invariant_checks_count,
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_single_threaded() {
        let mut harness = DstHarness::new(12345, HarnessConfig::quick());
        let mut sum = 0u64;

        let result = harness.run_single_threaded(
            |_env, step| (step < 10).then_some(step),
            |_env, op| {
                sum += op;
                Ok(())
            },
        );

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(result.operations_count, 10);
        assert_eq!(sum, 45);
    }

    #[test]
    fn test_harness_stops_on_violation() {
        let mut harness = DstHarness::new(12345, HarnessConfig::quick());

        let result = harness.run_single_threaded(
            |_env, step| Some(step),
            |_env, op| {
                if op == 5 {
                    Err("intentional failure".to_string())
                } else {
                    Ok(())
                }
            },
        );

        assert!(!result.all_invariants_held);
        assert_eq!(result.operations_count, 5);
        assert!(result.format().contains("step 5: intentional failure"));
    }

    #[test]
    fn test_harness_concurrent_interleaves() {
        let config = HarnessConfig {
            threads_count: 3,
            operations_per_thread: 20,
            yield_probability: 0.5,
            ..HarnessConfig::quick()
        };
        let mut harness = DstHarness::new(999, config);
        let mut per_thread = vec![0u64; 3];
        let mut order = Vec::new();

        let result = harness.run_concurrent(
            |_env, thread, _step| Some(thread),
            |_env, thread, _op| {
                per_thread[thread] += 1;
                order.push(thread);
                Ok(())
            },
            Vec::new,
        );

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(per_thread, vec![20, 20, 20]);
        assert!(result.context_switches_count > 0);
        assert!(order.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_failed_invariant_stops_run() {
        let config = HarnessConfig {
            invariant_check_interval: 4,
            ..HarnessConfig::quick()
        };
        let mut harness = DstHarness::new(31, config);
        let executed = std::cell::Cell::new(0u64);

        let result = harness.run_concurrent(
            |_env, _thread, step| Some(step),
            |_env, _thread, _op| {
                executed.set(executed.get() + 1);
                Ok(())
            },
            || {
                if executed.get() >= 8 {
                    vec![PropertyResult::fail("Budget", "too many ops", None)]
                } else {
                    vec![PropertyResult::pass("Budget")]
                }
            },
        );

        assert!(!result.all_invariants_held);
        assert_eq!(result.operations_count, 8);
        assert!(result.first_violation.unwrap().contains("[FAIL] Budget"));
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let trace = |seed| {
            let mut harness = DstHarness::new(seed, HarnessConfig::default());
            let mut order = Vec::new();
            harness.run_concurrent(
                |_env, thread, _| Some(thread),
                |_env, thread, _| {
                    order.push(thread);
                    Ok(())
                },
                Vec::new,
            );
            order
        };
        assert_eq!(trace(4242), trace(4242));
    }
}
