//! Counterexample representation and rendering.
//!
//! When a checker finds a violation it can attach the steps that led there:
//! which thread did what, and what the model state looked like at each step.

use std::fmt::Write as _;

/// A counterexample showing the failure path.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Model state after selected steps.
    pub states: Vec<StateSnapshot>,
    /// Thread actions in step order.
    pub interleaving: Vec<ThreadAction>,
    /// DST seed for reproduction (if the history came from a DST run).
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure.
    pub description: Option<String>,
}

/// Snapshot of model state at one step.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the history
    pub step: u64,
    /// Short description shown in the diagram's state column
    pub description: String,
    /// Named variable values at this point
    pub variables: Vec<(String, String)>,
}

/// One action taken by one thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    /// Thread (or actor) identifier
    pub thread_id: u64,
    /// Step number when this action occurred
    pub step: u64,
    /// What the thread did, e.g. `write_lock()`
    pub action: String,
    /// Whether the action succeeded
    pub success: bool,
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample carrying a DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Seeded when a seed is known, plain otherwise.
    #[must_use]
    pub fn for_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    /// Set the description for this counterexample.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot. Snapshots must be added in step order.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    /// Add a thread action.
    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Record `action` by `thread_id` at `step`.
    pub fn record(&mut self, thread_id: u64, step: u64, action: impl Into<String>, success: bool) {
        self.add_action(ThreadAction {
            thread_id,
            step,
            action: action.into(),
            success,
        });
    }

    /// Render as a thread diagram, one column per thread.
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0       | Thread 1       | State
    /// -----|----------------|----------------|------
    ///    1 | write_lock()   |                | waiting_writers=1
    ///    2 |                | read_lock()    | readers=1
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            let _ = writeln!(output, "DST_SEED={}\n", seed);
        }

        if let Some(ref desc) = self.description {
            let _ = writeln!(output, "Failure: {}\n", desc);
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
            return output;
        }

        let width = self
            .interleaving
            .iter()
            .map(|a| a.action.len() + if a.success { 0 } else { 7 })
            .chain(threads.iter().map(|t| format!("Thread {}", t).len()))
            .max()
            .unwrap_or(8);

        output.push_str("Step |");
        for tid in &threads {
            let _ = write!(output, " {:<width$} |", format!("Thread {}", tid));
        }
        output.push_str(" State\n-----|");
        for _ in &threads {
            output.push_str(&"-".repeat(width + 2));
            output.push('|');
        }
        output.push_str("------\n");

        let mut steps: Vec<u64> = self
            .interleaving
            .iter()
            .map(|a| a.step)
            .chain(self.states.iter().map(|s| s.step))
            .collect();
        steps.sort_unstable();
        steps.dedup();

        for step in steps {
            let _ = write!(output, "{:4} |", step);
            for tid in &threads {
                let cell = self
                    .interleaving
                    .iter()
                    .find(|a| a.step == step && a.thread_id == *tid)
                    .map(|a| {
                        if a.success {
                            a.action.clone()
                        } else {
                            format!("{} [FAIL]", a.action)
                        }
                    })
                    .unwrap_or_default();
                let _ = write!(output, " {:<width$} |", cell);
            }
            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                let _ = write!(output, " {}", state.description);
            }
            output.push('\n');
        }

        output
    }
}
