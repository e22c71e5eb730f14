//! Independent sources: VoltageSource (backed by its own MNA unknown) and
//! CurrentSource.

use std::fmt;

use super::{impl_downcast, Device, Port, Terminals};
use crate::error::{MnaError, Result};
use crate::solver::MnaSystem;

/// An ideal voltage source holding slot 0 `potential` volts above slot 1.
///
/// Owns one [`super::VSource`]; its current is solved for directly.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    /// Source voltage in volts
    pub potential: f64,
    terminals: Terminals,
}

impl VoltageSource {
    pub fn new(potential: f64) -> Self {
        Self {
            name: "v".to_string(),
            potential,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Current through the source after the last solve.
    pub fn current(&self) -> f64 {
        self.terminals.vsource(0).map_or(0.0, |vs| vs.current())
    }

    pub fn power(&self) -> f64 {
        self.u() * self.current()
    }

    /// Change the source voltage in place; only the known vector moves, so
    /// the factorization stays valid.
    pub fn set_potential(&mut self, sys: &mut MnaSystem, potential: f64) {
        self.potential = potential;
        if let Some(vs) = self.terminals.vsource_mut(0) {
            let delta = potential - vs.potential();
            vs.change(sys, delta);
        }
    }
}

impl Device for VoltageSource {
    const VS_COUNT: usize = 1;

    impl_downcast!(VoltageSource);

    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn check(&self) -> Result<()> {
        if !self.potential.is_finite() {
            return Err(MnaError::invalid_parameter(&self.name, "potential", self.potential));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        let (pos, neg, potential) = (self.pos(), self.neg(), self.potential);
        if let Some(vs) = self.terminals.vsource_mut(0) {
            vs.stamp(sys, pos, neg, potential);
        }
        Ok(())
    }
}

impl fmt::Display for VoltageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[voltage source {}: {}V, {:.6}A]",
            self.name,
            self.potential,
            self.current()
        )
    }
}

/// An ideal current source driving `current` amperes out of slot 0 into
/// slot 1.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    /// Source current in amperes
    pub current: f64,
    terminals: Terminals,
}

impl CurrentSource {
    pub fn new(current: f64) -> Self {
        Self {
            name: "i".to_string(),
            current,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn power(&self) -> f64 {
        self.u() * self.current
    }

    /// Change the driven current, stamping only the difference.
    pub fn set_current(&mut self, sys: &mut MnaSystem, current: f64) {
        sys.stamp_current_source(self.pos(), self.neg(), current - self.current);
        self.current = current;
    }
}

impl Device for CurrentSource {
    impl_downcast!(CurrentSource);

    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn check(&self) -> Result<()> {
        if !self.current.is_finite() {
            return Err(MnaError::invalid_parameter(&self.name, "current", self.current));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        sys.stamp_current_source(self.pos(), self.neg(), self.current);
        Ok(())
    }
}

impl fmt::Display for CurrentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[current source {}: {:.6}V, {}A]",
            self.name,
            self.u(),
            self.current
        )
    }
}
