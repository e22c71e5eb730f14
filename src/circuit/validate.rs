//! Circuit validation.

use crate::error::{MnaError, Result};

use super::Circuit;

/// Validate a circuit for simulation.
///
/// Checks:
/// - Some terminal reaches ground (unless the circuit is empty)
/// - Component parameters are physically meaningful
///
/// Stepping never requires this; a circuit that fails here still steps, it
/// just produces a singular system or meaningless values.
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.is_empty() {
        return Ok(());
    }

    if circuit.is_floating() {
        return Err(MnaError::FloatingCircuit);
    }

    for (_, component) in circuit.components() {
        component.check()?;
    }

    Ok(())
}
