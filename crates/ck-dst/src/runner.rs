//! Fault-injecting runners for stacks and queues.
//!
//! Faults fire at OPERATION BOUNDARIES, never inside the structure. The
//! structure under test is called exactly as production code would call it;
//! the runner decides, before and after each call, whether the simulated
//! caller gives up, stalls, or loses the reply.
//!
//! | Fault | Point | Effect |
//! |-------|-------|--------|
//! | `Abandon` | before | The operation never starts |
//! | `Delay` | either | Simulated time advances |
//! | `LostReply` | after | The operation happened, the caller never sees the result |
//!
//! Runners record every completed operation, so they implement the
//! `ck-core` property traits and can be handed straight to a checker.

use std::collections::HashSet;

use ck_core::invariants::{
    QueueHistory, QueueOp, QueueProperties, QueuePropertyChecker, Rejection, StackHistory,
    StackProperties, StackPropertyChecker,
};
use ck_core::{PropertyChecker, PropertyResult};

use crate::{DeterministicRng, DstEnv, FaultConfig};

/// Where a fault is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

/// Kinds of injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Abandon,
    Delay,
    LostReply,
}

/// Minimal stack surface the runner drives.
pub trait DstTestableStack: Send + Sync {
    fn new() -> Self;
    fn push(&self, value: u64);
    fn pop(&self) -> Option<u64>;
    fn is_empty(&self) -> bool;
    /// Contents top to bottom. Only called while no operation is in flight.
    fn contents(&self) -> Vec<u64>;
}

/// Minimal queue surface the runner drives. Only non-blocking calls.
pub trait DstTestableQueue: Send + Sync {
    fn with_capacity(capacity: usize) -> Self;
    fn try_push(&self, value: u64) -> Result<(), Rejection>;
    fn try_pop(&self) -> Option<u64>;
    fn close(&self);
    fn clear(&self);
    fn capacity(&self) -> usize;
    /// Contents front to back.
    fn contents(&self) -> Vec<u64>;
}

/// Counters shared by both runners.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub lost_replies: u64,
}

impl RunnerStats {
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} lost_replies={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.lost_replies
        )
    }
}

/// Boundary fault logic shared by the runners.
struct Boundary {
    env: DstEnv,
    stats: RunnerStats,
}

impl Boundary {
    fn new(seed: u64, config: FaultConfig) -> Self {
        Self {
            env: DstEnv::with_fault_config(seed, config),
            stats: RunnerStats {
                seed,
                ..RunnerStats::default()
            },
        }
    }

    /// `Some(fault)` when the caller must stop at this point.
    fn check(&mut self, point: FaultPoint) -> Option<FaultType> {
        if !self.env.fault().should_fail() {
            return None;
        }
        self.stats.faults_injected += 1;

        let choices = match point {
            FaultPoint::BeforeOperation => [FaultType::Abandon, FaultType::Delay],
            FaultPoint::AfterOperation => [FaultType::LostReply, FaultType::Delay],
        };
        match self.env.fault().choose(&choices)? {
            FaultType::Delay => {
                let us = self.env.rng().gen_range(1..=100_u64);
                self.env.clock().advance_us(us);
                None
            }
            FaultType::Abandon => {
                self.stats.abandoned_operations += 1;
                Some(FaultType::Abandon)
            }
            FaultType::LostReply => {
                self.stats.lost_replies += 1;
                Some(FaultType::LostReply)
            }
        }
    }
}

/// Drives a stack through faulty callers, recording what happened.
pub struct StackRunner<S> {
    stack: S,
    boundary: Boundary,
    pushed: HashSet<u64>,
    popped: Vec<u64>,
    history: StackHistory,
}

impl<S: DstTestableStack> StackRunner<S> {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        Self {
            stack: S::new(),
            boundary: Boundary::new(seed, config),
            pushed: HashSet::new(),
            popped: Vec::new(),
            history: StackHistory::new(),
        }
    }

    #[must_use]
    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn push(&mut self, value: u64) -> Result<(), FaultType> {
        if let Some(fault) = self.boundary.check(FaultPoint::BeforeOperation) {
            return Err(fault);
        }

        self.stack.push(value);
        self.boundary.stats.operations_count += 1;
        self.pushed.insert(value);
        self.history.record_push(0, value);

        match self.boundary.check(FaultPoint::AfterOperation) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    pub fn pop(&mut self) -> Result<Option<u64>, FaultType> {
        if let Some(fault) = self.boundary.check(FaultPoint::BeforeOperation) {
            return Err(fault);
        }

        let result = self.stack.pop();
        self.boundary.stats.operations_count += 1;
        self.popped.extend(result);
        self.history.record_pop(0, result);

        // A lost reply still took the value off the stack.
        match self.boundary.check(FaultPoint::AfterOperation) {
            Some(fault) => Err(fault),
            None => Ok(result),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        self.boundary.stats
    }

    #[must_use]
    pub fn check(&self) -> Vec<PropertyResult> {
        StackPropertyChecker::new(self)
            .with_seed(self.boundary.stats.seed)
            .check_all()
    }
}

impl<S: DstTestableStack> StackProperties for StackRunner<S> {
    fn pushed_elements(&self) -> HashSet<u64> {
        self.pushed.clone()
    }

    fn popped_elements(&self) -> Vec<u64> {
        self.popped.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.stack.contents()
    }

    fn history(&self) -> StackHistory {
        self.history.clone()
    }
}

/// Drives a bounded queue through faulty callers.
pub struct QueueRunner<Q> {
    queue: Q,
    boundary: Boundary,
    history: QueueHistory,
}

impl<Q: DstTestableQueue> QueueRunner<Q> {
    #[must_use]
    pub fn new(seed: u64, capacity: usize) -> Self {
        Self::with_fault_config(seed, capacity, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, capacity: usize, config: FaultConfig) -> Self {
        Self {
            queue: Q::with_capacity(capacity),
            boundary: Boundary::new(seed, config),
            history: QueueHistory::new(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Inner result is the queue's own answer; the outer one is the fault.
    pub fn try_push(&mut self, value: u64) -> Result<Result<(), Rejection>, FaultType> {
        self.run(|q| {
            let result = q.try_push(value);
            let op = match result {
                Ok(()) => QueueOp::Push(value),
                Err(why) => QueueOp::PushRejected(value, why),
            };
            (result, op)
        })
    }

    pub fn try_pop(&mut self) -> Result<Option<u64>, FaultType> {
        self.run(|q| {
            let result = q.try_pop();
            (result, result.map_or(QueueOp::PopEmpty, QueueOp::Pop))
        })
    }

    pub fn close(&mut self) -> Result<(), FaultType> {
        self.run(|q| {
            q.close();
            ((), QueueOp::Close)
        })
    }

    pub fn clear(&mut self) -> Result<(), FaultType> {
        self.run(|q| {
            q.clear();
            ((), QueueOp::Clear)
        })
    }

    fn run<R>(&mut self, op: impl FnOnce(&Q) -> (R, QueueOp)) -> Result<R, FaultType> {
        if let Some(fault) = self.boundary.check(FaultPoint::BeforeOperation) {
            return Err(fault);
        }

        let (result, recorded) = op(&self.queue);
        self.boundary.stats.operations_count += 1;
        self.history.record(0, recorded);

        match self.boundary.check(FaultPoint::AfterOperation) {
            Some(fault) => Err(fault),
            None => Ok(result),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        self.boundary.stats
    }

    #[must_use]
    pub fn check(&self) -> Vec<PropertyResult> {
        QueuePropertyChecker::new(self)
            .with_seed(self.boundary.stats.seed)
            .check_all()
    }
}

impl<Q: DstTestableQueue> QueueProperties for QueueRunner<Q> {
    fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.contents()
    }

    fn history(&self) -> QueueHistory {
        self.history.clone()
    }
}

/// Stack scenario step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStep {
    Push(u64),
    Pop,
}

/// Queue scenario step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStep {
    Push(u64),
    Pop,
    Close,
    Clear,
}

/// Random stack workload with unique pushed values.
#[must_use]
pub fn generate_stack_steps(rng: &mut DeterministicRng, count: usize) -> Vec<StackStep> {
    let mut next = 1;
    (0..count)
        .map(|_| {
            if rng.gen_bool(0.55) {
                next += 1;
                StackStep::Push(next - 1)
            } else {
                StackStep::Pop
            }
        })
        .collect()
}

/// Random queue workload with unique pushed values.
///
/// Close is rare and, once drawn, the remaining steps still run so that the
/// post-close behaviour gets exercised.
#[must_use]
pub fn generate_queue_steps(rng: &mut DeterministicRng, count: usize) -> Vec<QueueStep> {
    let mut next = 1;
    (0..count)
        .map(|_| match rng.gen_range(0..100_u32) {
            0 => QueueStep::Close,
            1..=2 => QueueStep::Clear,
            3..=52 => {
                next += 1;
                QueueStep::Push(next - 1)
            }
            _ => QueueStep::Pop,
        })
        .collect()
}

/// Outcome of a scenario run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub results: Vec<PropertyResult>,
    pub stats: RunnerStats,
    pub faults: Vec<FaultType>,
}

impl ScenarioResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.holds)
    }

    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        let mut out = format!("[{}] {}", status, self.stats.format());
        for r in self.results.iter().filter(|r| !r.holds) {
            out.push_str(&format!("\n  {}", r));
        }
        out
    }
}

/// Run `steps` against a fresh stack; faults are expected and do not fail the run.
#[must_use]
pub fn run_stack_scenario<S: DstTestableStack>(
    seed: u64,
    config: FaultConfig,
    steps: &[StackStep],
) -> ScenarioResult {
    let mut runner: StackRunner<S> = StackRunner::with_fault_config(seed, config);
    let mut faults = Vec::new();

    for step in steps {
        let outcome = match *step {
            StackStep::Push(v) => runner.push(v),
            StackStep::Pop => runner.pop().map(|_| ()),
        };
        if let Err(fault) = outcome {
            faults.push(fault);
        }
    }

    ScenarioResult {
        results: runner.check(),
        stats: runner.stats(),
        faults,
    }
}

/// Run `steps` against a fresh queue of the given capacity.
#[must_use]
pub fn run_queue_scenario<Q: DstTestableQueue>(
    seed: u64,
    capacity: usize,
    config: FaultConfig,
    steps: &[QueueStep],
) -> ScenarioResult {
    let mut runner: QueueRunner<Q> = QueueRunner::with_fault_config(seed, capacity, config);
    let mut faults = Vec::new();

    for step in steps {
        let outcome = match *step {
            QueueStep::Push(v) => runner.try_push(v).map(|_| ()),
            QueueStep::Pop => runner.try_pop().map(|_| ()),
            QueueStep::Close => runner.close(),
            QueueStep::Clear => runner.clear(),
        };
        if let Err(fault) = outcome {
            faults.push(fault);
        }
    }

    ScenarioResult {
        results: runner.check(),
        stats: runner.stats(),
        faults,
    }
}
