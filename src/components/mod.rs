//! Device models and the contract the circuit drives them through.
//!
//! This module provides:
//! - Linear: Resistor, DynamicResistor, Capacitor, Inductor
//! - Sources: VoltageSource, CurrentSource
//! - Nonlinear: IdealDiode, RealisticDiode (with the [`DiodeData`] model table)
//!
//! Every device owns a [`Terminals`] block that the circuit fills in when the
//! device is added, and implements [`Device`] to stamp itself into the
//! [`MnaSystem`] and take part in the per-tick step protocol.

mod diode;
mod linear;
mod sources;
mod terminals;
mod vsource;

pub use diode::{DiodeData, IdealDiode, RealisticDiode};
pub use linear::{Capacitor, DynamicResistor, Inductor, Resistor, DEFAULT_TIME_STEP};
pub use sources::{CurrentSource, VoltageSource};
pub use terminals::Terminals;
pub use vsource::VSource;

use std::fmt;

use crate::error::Result;
use crate::solver::MnaSystem;

/// The contract between a device and the circuit that owns it.
///
/// A tick runs `pre_step` once, then `sim_step` for every substep, then
/// `post_step` once. All stamping goes through the [`MnaSystem`] passed in;
/// the system silently ignores stamps while it is not assembled.
pub trait Device: fmt::Debug + fmt::Display + Sized + Into<Component> {
    /// Node slots the device needs.
    const NODE_COUNT: usize = 2;
    /// Voltage-source unknowns the device needs.
    const VS_COUNT: usize = 0;

    fn name(&self) -> &str;

    fn terminals(&self) -> &Terminals;

    fn terminals_mut(&mut self) -> &mut Terminals;

    /// Write this device's full contribution into a freshly allocated system.
    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()>;

    /// Called once, right after the device is added to a circuit.
    fn added(&mut self) {}

    /// Reject parameters no simulation could make sense of.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    fn pre_step(&mut self, _dt: f64, _sys: &mut MnaSystem) -> Result<()> {
        Ok(())
    }

    /// One nonlinear refinement; re-stamp only when the operating point
    /// moved by more than `slack` volts.
    fn sim_step(&mut self, _sys: &mut MnaSystem, _slack: f64) -> Result<()> {
        Ok(())
    }

    fn post_step(&mut self, _dt: f64) {}

    fn downcast(component: &Component) -> Option<&Self>;

    fn downcast_mut(component: &mut Component) -> Option<&mut Self>;

    fn from_component(component: Component) -> std::result::Result<Self, Component>;
}

/// Two-terminal view of a device: slot 0 is positive, slot 1 negative.
pub trait Port: Device {
    /// Potential across the port, in volts.
    fn u(&self) -> f64 {
        self.terminals().u()
    }

    fn pos(&self) -> Option<usize> {
        self.terminals().pos()
    }

    fn neg(&self) -> Option<usize> {
        self.terminals().neg()
    }
}

impl<D: Device> Port for D {}

/// Expands to the `downcast*` methods of [`Device`] for one enum variant.
macro_rules! impl_downcast {
    ($variant:ident) => {
        fn downcast(component: &$crate::components::Component) -> Option<&Self> {
            match component {
                $crate::components::Component::$variant(d) => Some(d),
                _ => None,
            }
        }

        fn downcast_mut(component: &mut $crate::components::Component) -> Option<&mut Self> {
            match component {
                $crate::components::Component::$variant(d) => Some(d),
                _ => None,
            }
        }

        fn from_component(
            component: $crate::components::Component,
        ) -> std::result::Result<Self, $crate::components::Component> {
            match component {
                $crate::components::Component::$variant(d) => Ok(d),
                other => Err(other),
            }
        }
    };
}

pub(crate) use impl_downcast;

/// A device owned by a circuit.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    DynamicResistor(DynamicResistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    IdealDiode(IdealDiode),
    RealisticDiode(RealisticDiode),
}

macro_rules! dispatch {
    ($component:expr, $d:ident => $body:expr) => {
        match $component {
            Component::Resistor($d) => $body,
            Component::DynamicResistor($d) => $body,
            Component::Capacitor($d) => $body,
            Component::Inductor($d) => $body,
            Component::VoltageSource($d) => $body,
            Component::CurrentSource($d) => $body,
            Component::IdealDiode($d) => $body,
            Component::RealisticDiode($d) => $body,
        }
    };
}

macro_rules! impl_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Component {
                fn from(device: $variant) -> Self {
                    Component::$variant(device)
                }
            }
        )*
    };
}

impl_from!(
    Resistor,
    DynamicResistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    IdealDiode,
    RealisticDiode,
);

impl Component {
    /// Short type name, e.g. `"resistor"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Resistor(_) => "resistor",
            Component::DynamicResistor(_) => "dynamic resistor",
            Component::Capacitor(_) => "capacitor",
            Component::Inductor(_) => "inductor",
            Component::VoltageSource(_) => "voltage source",
            Component::CurrentSource(_) => "current source",
            Component::IdealDiode(_) => "ideal diode",
            Component::RealisticDiode(_) => "diode",
        }
    }

    pub fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    pub fn node_count(&self) -> usize {
        self.terminals().len()
    }

    pub fn vs_count(&self) -> usize {
        self.terminals().vsources().len()
    }

    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Component::IdealDiode(_) | Component::RealisticDiode(_))
    }

    pub fn terminals(&self) -> &Terminals {
        dispatch!(self, d => d.terminals())
    }

    pub(crate) fn terminals_mut(&mut self) -> &mut Terminals {
        dispatch!(self, d => d.terminals_mut())
    }

    pub(crate) fn check(&self) -> Result<()> {
        dispatch!(self, d => d.check())
    }

    pub(crate) fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        dispatch!(self, d => d.stamp(sys))
    }

    pub(crate) fn pre_step(&mut self, dt: f64, sys: &mut MnaSystem) -> Result<()> {
        dispatch!(self, d => d.pre_step(dt, sys))
    }

    pub(crate) fn sim_step(&mut self, sys: &mut MnaSystem, slack: f64) -> Result<()> {
        dispatch!(self, d => d.sim_step(sys, slack))
    }

    pub(crate) fn post_step(&mut self, dt: f64) {
        dispatch!(self, d => d.post_step(dt))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, d => fmt::Display::fmt(d, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_matches_variant() {
        let component: Component = Resistor::new(10.0).into();
        assert!(Resistor::downcast(&component).is_some());
        assert!(Capacitor::downcast(&component).is_none());
        assert_eq!(component.kind(), "resistor");
        assert!(!component.is_nonlinear());
    }

    #[test]
    fn test_from_component_returns_mismatch() {
        let component: Component = IdealDiode::new().into();
        let back = Resistor::from_component(component);
        assert!(matches!(back, Err(Component::IdealDiode(_))));
    }

    #[test]
    fn test_unattached_terminals_are_empty() {
        let component: Component = VoltageSource::new(5.0).into();
        assert_eq!(component.node_count(), 0);
        assert!(!component.terminals().is_attached());
    }
}
