//! Probabilistic fault injection.
//!
//! | Preset | Failure | Delay |
//! |--------|---------|-------|
//! | `none()` | 0 | 0 |
//! | `default()` | 2% | 10% |
//! | `aggressive()` | 15% | 30% |

use std::fmt;

use crate::random::DeterministicRng;

/// How often faults fire.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability that `should_fail` returns true
    pub failure_probability: f64,
    /// Probability that `should_delay` returns a delay
    pub delay_probability: f64,
    /// Upper bound for an injected delay, in microseconds
    pub max_delay_us: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.02,
            delay_probability: 0.1,
            max_delay_us: 100,
        }
    }
}

impl FaultConfig {
    /// No faults at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            max_delay_us: 0,
        }
    }

    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.15,
            delay_probability: 0.3,
            max_delay_us: 1_000,
        }
    }
}

/// Counters for one injector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

impl fmt::Display for FaultStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checks={} faults={} delays={}",
            self.checks_count, self.faults_count, self.delays_count
        )
    }
}

/// Decides, deterministically, when a fault fires.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "failure_probability out of range: {}",
            config.failure_probability
        );
        debug_assert!(
            (0.0..=1.0).contains(&config.delay_probability),
            "delay_probability out of range: {}",
            config.delay_probability
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        let fail = self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Delay to inject, in microseconds, if one fires.
    pub fn should_delay(&mut self) -> Option<u64> {
        if self.config.max_delay_us == 0 || !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(self.rng.gen_range(1..=self.config.max_delay_us))
    }

    /// Pick one of `choices` uniformly, for callers that model several fault kinds.
    pub fn choose<T: Copy>(&mut self, choices: &[T]) -> Option<T> {
        if choices.is_empty() {
            return None;
        }
        Some(choices[self.rng.gen_range(0..choices.len())])
    }

    #[must_use]
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fires() {
        let mut injector = FaultInjector::new(DeterministicRng::new(3), FaultConfig::none());
        for _ in 0..1000 {
            assert!(!injector.should_fail());
            assert!(injector.should_delay().is_none());
        }
        assert_eq!(injector.stats().checks_count, 1000);
        assert_eq!(injector.stats().faults_count, 0);
    }

    #[test]
    fn test_aggressive_fires_and_is_deterministic() {
        let run = |seed| {
            let mut injector =
                FaultInjector::new(DeterministicRng::new(seed), FaultConfig::aggressive());
            (0..500).map(|_| injector.should_fail()).collect::<Vec<_>>()
        };
        let first = run(17);
        assert_eq!(first, run(17));
        assert!(first.iter().any(|f| *f));
    }

    #[test]
    fn test_delay_within_bound() {
        let mut injector = FaultInjector::new(DeterministicRng::new(8), FaultConfig::aggressive());
        for _ in 0..500 {
            if let Some(us) = injector.should_delay() {
                assert!((1..=1_000).contains(&us));
            }
        }
        assert!(injector.stats().delays_count > 0);
    }
}
