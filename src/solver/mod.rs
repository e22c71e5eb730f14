//! MNA (Modified Nodal Analysis) system assembly and solving.
//!
//! This module provides the numerical engine behind [`crate::Circuit`].
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = z where:
//! - x contains node potentials and voltage-source currents
//! - A is the conductance/connectivity matrix
//! - z is the vector of known currents and source potentials
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is zero for ideal voltage sources
//! - v is the vector of node potentials
//! - j is the vector of voltage source currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! Every contribution ("stamp") is additive, so a device can withdraw its
//! previous contribution by stamping the negated value.

mod mna;

pub use mna::MnaSystem;

/// Default upper bound on nonlinear substeps per tick.
pub const DEFAULT_MAX_SUB_STEPS: usize = 100;

/// Default voltage tolerance below which nonlinear devices stop iterating.
pub const DEFAULT_SLACK: f64 = 0.001;

/// Pivot magnitude below which the matrix is treated as singular.
pub const PIVOT_EPSILON: f64 = 1e-15;
