//! # ck-dst
//!
//! Deterministic Simulation Testing for the conkit primitives.
//!
//! Every source of nondeterminism a test controls (randomness, time, faults,
//! the interleaving of simulated threads) is derived from one seed, so a
//! failing run is reproduced by rerunning with that seed.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `random` | Seeded rng |
//! | `clock` | Simulated time |
//! | `fault` | Probabilistic fault injection |
//! | `scheduler` | Random interleaving of simulated threads |
//! | `env` | All of the above behind one seed |
//! | `harness` | Runs simulated threads and periodic invariant checks |
//! | `runner` | Faults at operation boundaries for stacks and queues |
//! | `sequencer` | Scripted turn order for real OS threads |
//!
//! ## Usage
//!
//! ```
//! use ck_dst::{DstEnv, FaultConfig};
//!
//! let mut env = DstEnv::with_fault_config(12345, FaultConfig::aggressive());
//! let op = env.rng().gen_range(0..3_u8);
//! env.clock().advance_us(50);
//! if env.fault().should_fail() {
//!     // the simulated caller gives up here
//! }
//! assert!(op < 3);
//! ```
//!
//! ## Reproducibility
//!
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod harness;
pub mod random;
pub mod runner;
pub mod scheduler;
pub mod sequencer;

pub use clock::SimClock;
pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use random::DeterministicRng;
pub use runner::{
    generate_queue_steps, generate_stack_steps, run_queue_scenario, run_stack_scenario,
    DstTestableQueue, DstTestableStack, FaultPoint, FaultType, QueueRunner, QueueStep,
    RunnerStats, ScenarioResult, StackRunner, StackStep,
};
pub use scheduler::{ScheduleDecision, Scheduler};
pub use sequencer::{eventually, Sequencer};

/// Seed from `DST_SEED`, or a fresh random one.
///
/// The seed is printed either way so a failing run can be replayed.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    if let Ok(s) = std::env::var("DST_SEED") {
        match s.trim().parse::<u64>() {
            Ok(seed) if seed != 0 => {
                println!("DST_SEED={} (from environment)", seed);
                return seed;
            }
            _ => eprintln!("ignoring invalid DST_SEED={:?}", s),
        }
    }
    let seed = rand::random::<u64>().max(1);
    println!("DST_SEED={} (randomly generated)", seed);
    seed
}

/// Iteration count from `DST_ITERATIONS`, or `default`.
#[must_use]
pub fn get_iterations(default: u64) -> u64 {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}
