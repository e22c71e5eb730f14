//! Bookkeeping for one independent voltage-source unknown.

use std::fmt;

use crate::solver::MnaSystem;

/// One voltage-source row/column of the MNA system.
///
/// Owned by the component that requested it. `potential` is the value last
/// written into the known vector and only moves through [`VSource::stamp`]
/// or [`VSource::change`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VSource {
    current: f64,
    potential: f64,
    index: Option<usize>,
}

impl VSource {
    /// Current through the source, in amperes.
    ///
    /// Signed opposite to the conventional source current: it is the
    /// negated solution entry of the source row.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// The potential last stamped for this source, in volts.
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Source number (offset past the node rows); `None` before assembly.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: Option<usize>) {
        self.index = index;
    }

    pub(crate) fn set_current(&mut self, current: f64) {
        self.current = current;
    }

    /// Wire this source between `pos` and `neg` and commit `v` volts.
    pub(crate) fn stamp(&mut self, sys: &mut MnaSystem, pos: Option<usize>, neg: Option<usize>, v: f64) {
        self.potential = v;
        sys.stamp_voltage_source(pos, neg, self.index, v);
    }

    /// Shift the stamped potential by `delta` volts; touches only the
    /// known vector.
    pub(crate) fn change(&mut self, sys: &mut MnaSystem, delta: f64) {
        sys.stamp_voltage_change(self.index, delta);
        self.potential += delta;
    }
}

impl fmt::Display for VSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "[vsource #{i}: {}V, {}A]", self.potential, self.current),
            None => write!(f, "[vsource: {}V, {}A]", self.potential, self.current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_is_incremental() {
        let mut sys = MnaSystem::new();
        sys.allocate(1, 1);
        let mut vs = VSource::default();
        vs.set_index(Some(0));

        vs.stamp(&mut sys, Some(0), None, 5.0);
        vs.change(&mut sys, 2.5);

        assert_eq!(vs.potential(), 7.5);
        assert_eq!(sys.known(1), 7.5);
        assert_eq!(sys.entry(1, 0), 1.0);
    }

    #[test]
    fn test_unassembled_change_only_records() {
        let mut sys = MnaSystem::new();
        let mut vs = VSource::default();
        vs.change(&mut sys, 3.0);
        assert_eq!(vs.potential(), 3.0);
        assert!(!sys.is_dirty());
    }
}
