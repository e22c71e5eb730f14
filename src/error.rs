//! Error types for the MNA circuit solver.
//!
//! This module provides a unified error type [`MnaError`] that covers
//! configuration mistakes (bad handles, impossible resistances) and the
//! numerical failures raised while factoring and solving the system.

use thiserror::Error;

use crate::circuit::ComponentId;

/// Result type alias using [`MnaError`].
pub type Result<T> = std::result::Result<T, MnaError>;

/// Unified error type for all circuit operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MnaError {
    // ============ Configuration Errors ============
    /// A resistance whose reciprocal is not a finite conductance
    #[error("resistance {resistance} is invalid (conductance is not finite)")]
    InvalidResistance { resistance: f64 },

    /// Handle is stale, removed, or belongs to another circuit
    #[error("component {component} is not part of this circuit")]
    NotInCircuit { component: ComponentId },

    /// Terminal slot out of range for the component
    #[error("component {component} has {count} terminals, slot {slot} does not exist")]
    InvalidSlot {
        component: ComponentId,
        slot: usize,
        count: usize,
    },

    /// Handle points at a different kind of device
    #[error("component {component} is not of the requested device kind")]
    KindMismatch { component: ComponentId },

    /// Time step must be positive and finite
    #[error("invalid time step {dt}")]
    InvalidTimeStep { dt: f64 },

    /// Unknown entry in the diode model table
    #[error("unknown diode model '{name}'")]
    UnknownDiodeModel { name: String },

    // ============ Validation Errors ============
    /// No terminal of any component reaches ground
    #[error("circuit is floating - no component is connected to ground")]
    FloatingCircuit,

    /// Physical parameter out of its valid range
    #[error("invalid {param} {value} on component '{component}'")]
    InvalidParameter {
        component: String,
        param: &'static str,
        value: f64,
    },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be factored
    #[error("singular matrix - circuit may be floating or contain a source loop")]
    SingularMatrix,

    /// Solve produced NaN or infinity
    #[error("non-finite value in solution row {row}")]
    NonFiniteSolution { row: usize },
}

impl MnaError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(component: impl Into<String>, param: &'static str, value: f64) -> Self {
        Self::InvalidParameter {
            component: component.into(),
            param,
            value,
        }
    }

    /// Whether this failure is local to one solve and leaves the circuit usable.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::SingularMatrix | Self::NonFiniteSolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numerical_errors_are_recoverable() {
        assert!(MnaError::SingularMatrix.is_numerical());
        assert!(MnaError::NonFiniteSolution { row: 0 }.is_numerical());
        assert!(!MnaError::InvalidResistance { resistance: 0.0 }.is_numerical());
        assert!(!MnaError::invalid_parameter("c1", "capacitance", -1.0).is_numerical());
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = MnaError::invalid_parameter("c1", "capacitance", -1.0);
        let message = err.to_string();
        assert!(message.contains("c1") && message.contains("capacitance"), "{message}");
    }
}
