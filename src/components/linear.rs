//! Linear passive components: Resistor, DynamicResistor, Capacitor, Inductor.
//!
//! Capacitor and inductor use backward-Euler companion models: a resistor of
//! equivalent resistance in parallel with a current source carrying the
//! previous tick's state.

use std::fmt;

use super::{impl_downcast, Device, Port, Terminals};
use crate::error::{MnaError, Result};
use crate::solver::MnaSystem;

/// Time step the companion models assume until the first tick says otherwise.
pub const DEFAULT_TIME_STEP: f64 = 0.05;

/// A fixed resistor.
///
/// Changing `resistance` through [`crate::Circuit::get_mut`] triggers a full
/// rebuild; use [`DynamicResistor`] for values that move every tick.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    /// Resistance in ohms
    pub resistance: f64,
    terminals: Terminals,
}

impl Resistor {
    pub fn new(resistance: f64) -> Self {
        Self {
            name: "r".to_string(),
            resistance,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Current from slot 0 to slot 1, in amperes.
    pub fn current(&self) -> f64 {
        self.u() / self.resistance
    }

    /// Dissipated power, in watts.
    pub fn power(&self) -> f64 {
        self.current() * self.u()
    }
}

impl Device for Resistor {
    impl_downcast!(Resistor);

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
        check_resistance(&self.name, self.resistance)
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        sys.stamp_resistor(self.pos(), self.neg(), self.resistance)
    }
}

impl fmt::Display for Resistor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[resistor {}: {:.6}V, {:.6}A, {}Ω, {:.6}W]",
            self.name,
            self.u(),
            self.current(),
            self.resistance,
            self.power()
        )
    }
}

/// A resistor whose value can be changed between (or within) ticks without
/// a rebuild: changes are applied as incremental stamps.
#[derive(Debug, Clone)]
pub struct DynamicResistor {
    pub name: String,
    resistance: f64,
    terminals: Terminals,
}

impl DynamicResistor {
    pub fn new(resistance: f64) -> Self {
        Self {
            name: "dr".to_string(),
            resistance,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn resistance(&self) -> f64 {
        self.resistance
    }

    pub fn current(&self) -> f64 {
        self.u() / self.resistance
    }

    pub fn power(&self) -> f64 {
        self.current() * self.u()
    }

    /// Move to a new resistance, replacing the old stamp with the new one.
    ///
    /// An invalid value is rejected before anything is stamped, so the
    /// previous contribution stays intact.
    pub fn set_resistance(&mut self, sys: &mut MnaSystem, resistance: f64) -> Result<()> {
        MnaSystem::conductance(resistance)?;
        if resistance == self.resistance {
            return Ok(());
        }
        let (pos, neg) = (self.pos(), self.neg());
        sys.stamp_resistor(pos, neg, -self.resistance)?;
        sys.stamp_resistor(pos, neg, resistance)?;
        self.resistance = resistance;
        Ok(())
    }
}

impl Device for DynamicResistor {
    impl_downcast!(DynamicResistor);

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
        check_resistance(&self.name, self.resistance)
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        sys.stamp_resistor(self.pos(), self.neg(), self.resistance)
    }
}

impl fmt::Display for DynamicResistor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[dynamic resistor {}: {:.6}V, {:.6}A, {}Ω]",
            self.name,
            self.u(),
            self.current(),
            self.resistance
        )
    }
}

/// A capacitor, modelled as `ts / C` ohms in parallel with a companion
/// current source of `-u / eqR`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    /// Capacitance in farads
    pub capacitance: f64,
    time_step: f64,
    companion: f64,
    last_current: f64,
    terminals: Terminals,
}

impl Capacitor {
    pub fn new(capacitance: f64) -> Self {
        Self {
            name: "c".to_string(),
            capacitance,
            time_step: DEFAULT_TIME_STEP,
            companion: 0.0,
            last_current: 0.0,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn equivalent_resistance(&self) -> f64 {
        self.time_step / self.capacitance
    }

    /// Time step the stamped companion model was built for.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn companion_current(&self) -> f64 {
        self.companion
    }

    /// Current committed at the end of the last tick.
    pub fn last_current(&self) -> f64 {
        self.last_current
    }

    /// Present current through the companion model.
    pub fn current(&self) -> f64 {
        self.u() / self.equivalent_resistance() + self.companion
    }

    /// Stored energy, in joules.
    pub fn energy(&self) -> f64 {
        0.5 * self.capacitance * self.u() * self.u()
    }
}

impl Device for Capacitor {
    impl_downcast!(Capacitor);

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
        if !(self.capacitance.is_finite() && self.capacitance > 0.0) {
            return Err(MnaError::invalid_parameter(&self.name, "capacitance", self.capacitance));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        let (pos, neg) = (self.pos(), self.neg());
        sys.stamp_resistor(pos, neg, self.equivalent_resistance())?;
        sys.stamp_current_source(pos, neg, self.companion);
        Ok(())
    }

    fn pre_step(&mut self, dt: f64, sys: &mut MnaSystem) -> Result<()> {
        let (pos, neg) = (self.pos(), self.neg());
        if dt != self.time_step {
            let eq_r = dt / self.capacitance;
            MnaSystem::conductance(eq_r)?;
            sys.stamp_resistor(pos, neg, -self.equivalent_resistance())?;
            sys.stamp_resistor(pos, neg, eq_r)?;
            self.time_step = dt;
        }
        let companion = -self.u() / self.equivalent_resistance();
        sys.stamp_current_source(pos, neg, companion - self.companion);
        self.companion = companion;
        Ok(())
    }

    fn post_step(&mut self, _dt: f64) {
        self.last_current = self.current();
    }
}

impl fmt::Display for Capacitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[capacitor {}: {:.6}V, {:.6}A, {}F]",
            self.name,
            self.u(),
            self.last_current,
            self.capacitance
        )
    }
}

/// An inductor, modelled as `L / ts` ohms in parallel with a companion
/// current source of `phi / L`.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    /// Inductance in henries
    pub inductance: f64,
    time_step: f64,
    companion: f64,
    flux: f64,
    terminals: Terminals,
}

impl Inductor {
    pub fn new(inductance: f64) -> Self {
        Self {
            name: "l".to_string(),
            inductance,
            time_step: DEFAULT_TIME_STEP,
            companion: 0.0,
            flux: 0.0,
            terminals: Terminals::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn equivalent_resistance(&self) -> f64 {
        self.inductance / self.time_step
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Accumulated flux linkage, in webers.
    pub fn flux(&self) -> f64 {
        self.flux
    }

    pub fn companion_current(&self) -> f64 {
        self.companion
    }

    pub fn current(&self) -> f64 {
        self.u() / self.equivalent_resistance() + self.companion
    }

    /// Stored energy, in joules.
    pub fn energy(&self) -> f64 {
        let i = self.current();
        0.5 * self.inductance * i * i
    }
}

impl Device for Inductor {
    impl_downcast!(Inductor);

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
        if !(self.inductance.is_finite() && self.inductance > 0.0) {
            return Err(MnaError::invalid_parameter(&self.name, "inductance", self.inductance));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        let (pos, neg) = (self.pos(), self.neg());
        sys.stamp_resistor(pos, neg, self.equivalent_resistance())?;
        sys.stamp_current_source(pos, neg, self.companion);
        Ok(())
    }

    fn pre_step(&mut self, dt: f64, sys: &mut MnaSystem) -> Result<()> {
        let (pos, neg) = (self.pos(), self.neg());
        if dt != self.time_step {
            let eq_r = self.inductance / dt;
            MnaSystem::conductance(eq_r)?;
            sys.stamp_resistor(pos, neg, -self.equivalent_resistance())?;
            sys.stamp_resistor(pos, neg, eq_r)?;
            self.time_step = dt;
        }
        let companion = self.flux / self.inductance;
        sys.stamp_current_source(pos, neg, companion - self.companion);
        self.companion = companion;
        Ok(())
    }

    fn post_step(&mut self, _dt: f64) {
        self.flux += self.u() * self.time_step;
    }
}

impl fmt::Display for Inductor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[inductor {}: {:.6}V, {:.6}A, {}H, {}Wb]",
            self.name,
            self.u(),
            self.current(),
            self.inductance,
            self.flux
        )
    }
}

fn check_resistance(name: &str, resistance: f64) -> Result<()> {
    if !(resistance.is_finite() && resistance > 0.0) {
        return Err(MnaError::invalid_parameter(name, "resistance", resistance));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeRef;
    use approx::assert_relative_eq;

    fn attached<D: Device>(mut device: D, sys_nodes: usize) -> D {
        let nodes = (1..=D::NODE_COUNT).map(NodeRef).collect();
        device.terminals_mut().attach(nodes, D::VS_COUNT);
        for slot in 0..D::NODE_COUNT.min(sys_nodes) {
            device.terminals_mut().relink(slot, NodeRef(slot + 1), Some(slot), 0.0);
        }
        device
    }

    #[test]
    fn test_dynamic_resistor_swaps_stamp() {
        let mut sys = MnaSystem::new();
        sys.allocate(2, 0);
        let mut r = attached(DynamicResistor::new(10.0), 2);
        r.stamp(&mut sys).unwrap();
        r.set_resistance(&mut sys, 5.0).unwrap();

        assert_relative_eq!(sys.entry(0, 0), 0.2, epsilon = 1e-12);
        assert_relative_eq!(sys.entry(0, 1), -0.2, epsilon = 1e-12);
        assert_eq!(r.resistance(), 5.0);
    }

    #[test]
    fn test_dynamic_resistor_rejects_zero_without_touching_stamp() {
        let mut sys = MnaSystem::new();
        sys.allocate(2, 0);
        let mut r = attached(DynamicResistor::new(10.0), 2);
        r.stamp(&mut sys).unwrap();

        assert!(r.set_resistance(&mut sys, 0.0).is_err());
        assert_eq!(r.resistance(), 10.0);
        assert_relative_eq!(sys.entry(0, 0), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_capacitor_restamps_on_new_time_step() {
        let mut sys = MnaSystem::new();
        sys.allocate(2, 0);
        let mut c = attached(Capacitor::new(1e-3), 2);
        c.stamp(&mut sys).unwrap();
        assert_relative_eq!(sys.entry(0, 0), 1e-3 / DEFAULT_TIME_STEP, epsilon = 1e-12);

        c.pre_step(0.01, &mut sys).unwrap();
        assert_eq!(c.time_step(), 0.01);
        assert_relative_eq!(sys.entry(0, 0), 1e-3 / 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_inductor_accumulates_flux() {
        let mut l = attached(Inductor::new(0.5), 2);
        l.terminals_mut().relink(0, NodeRef(1), Some(0), 2.0);
        l.post_step(DEFAULT_TIME_STEP);
        assert_relative_eq!(l.flux(), 2.0 * DEFAULT_TIME_STEP);
    }

    #[test]
    fn test_parameter_checks() {
        assert!(Resistor::new(-1.0).check().is_err());
        assert!(Capacitor::new(0.0).check().is_err());
        assert!(Inductor::new(f64::NAN).check().is_err());
        assert!(Resistor::new(1.0).check().is_ok());
    }
}
