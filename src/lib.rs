//! # MNA Core
//!
//! A real-time electrical circuit simulator based on Modified Nodal Analysis.
//!
//! This library provides:
//! - A circuit model with union-find node merging and generation-checked
//!   component handles
//! - Stamping of resistors, capacitors, inductors, diodes and independent
//!   sources into a dense MNA system
//! - LU factorization with partial pivoting, re-run only when the matrix
//!   actually changed
//! - A per-tick step protocol with bounded nonlinear substeps for diodes
//!
//! ## Architecture
//!
//! - [`circuit`] - Component ownership, wiring, assembly and stepping
//! - [`components`] - Device models and the [`components::Device`] contract
//! - [`solver`] - MNA system storage, stamping primitives and LU solving
//! - [`error`] - The crate-wide error type
//!
//! ## Usage
//!
//! ```
//! use mna_core::{Circuit, Resistor, VoltageSource};
//!
//! let mut circuit = Circuit::new();
//! let vs = circuit.add(VoltageSource::new(10.0));
//! let r = circuit.add(Resistor::new(10.0));
//! circuit.connect(vs, 0, r, 0)?;
//! circuit.connect(vs, 1, r, 1)?;
//! circuit.ground(vs, 0)?;
//!
//! circuit.step(0.05)?;
//! assert!((circuit.get(r)?.current() - 1.0).abs() < 1e-9);
//! # Ok::<(), mna_core::MnaError>(())
//! ```
//!
//! ## Simulation Method
//!
//! For each tick of length `dt`:
//!
//! 1. Rebuild the system if components or wiring changed
//! 2. Let every device update its companion model (`pre_step`)
//! 3. Factor (if the matrix changed) and solve, then let nonlinear devices
//!    re-linearize (`sim_step`); repeat while anything was re-stamped
//! 4. Let every device commit its history (`post_step`)
//!
//! Reactive elements (C, L) are discretized with backward Euler.

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::{
    validate_circuit, Circuit, CircuitConfig, ComponentId, Dot, Handle, HookId, StepReport,
};
pub use components::{
    Capacitor, Component, CurrentSource, Device, DiodeData, DynamicResistor, IdealDiode, Inductor,
    Port, RealisticDiode, Resistor, VoltageSource,
};
pub use error::{MnaError, Result};
pub use solver::MnaSystem;
