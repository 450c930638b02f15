//! Property results and the checker trait.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking one named invariant.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Invariant name, e.g. `FIFO_Order`.
    pub name: &'static str,
    /// Whether the invariant held.
    pub holds: bool,
    /// What went wrong, if it did not hold.
    pub violation: Option<String>,
    /// Failure path, when the checker could build one.
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// The invariant held.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// The invariant was violated.
    #[must_use]
    pub fn fail(
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name,
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "[PASS] {}", self.name),
            Some(violation) => {
                write!(f, "[FAIL] {}: {}", self.name, violation)?;
                if let Some(ce) = &self.counterexample {
                    write!(f, "\n{}", ce.render_diagram())?;
                }
                Ok(())
            }
        }
    }
}

/// A set of invariants checked together.
pub trait PropertyChecker {
    /// Check every invariant, in a stable order.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every invariant holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated invariants.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// One line per invariant, failures with their diagrams.
    fn report(&self) -> String {
        self.check_all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
