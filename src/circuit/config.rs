//! Tuning knobs for the per-tick stepping protocol.

use crate::solver::{DEFAULT_MAX_SUB_STEPS, DEFAULT_SLACK};

/// Configuration for a [`super::Circuit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitConfig {
    /// Maximum nonlinear substeps per tick.
    ///
    /// Running out is not an error; the tick simply ends with the last
    /// solution, trading guaranteed convergence for a bounded cost.
    pub max_sub_steps: usize,
    /// Voltage change (volts) below which nonlinear devices consider
    /// themselves converged.
    pub slack: f64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_sub_steps: DEFAULT_MAX_SUB_STEPS,
            slack: DEFAULT_SLACK,
        }
    }
}

impl CircuitConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum substeps per tick.
    pub fn with_max_sub_steps(mut self, max_sub_steps: usize) -> Self {
        self.max_sub_steps = max_sub_steps;
        self
    }

    /// Set the convergence slack (in volts).
    ///
    /// Higher slack = fewer substeps but coarser nonlinear solutions.
    pub fn with_slack(mut self, slack: f64) -> Self {
        self.slack = slack;
        self
    }
}
