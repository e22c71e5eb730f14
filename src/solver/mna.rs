//! MNA system storage, stamping and LU solving.

use std::fmt;

use crate::error::{MnaError, Result};

use super::PIVOT_EPSILON;

/// MNA matrix system Ax = z.
///
/// Rows `[0, node_count)` belong to nodes, rows `[node_count, size)` to
/// voltage sources. A `None` index always means ground and every stamp
/// against it is dropped. While the system is not assembled (empty circuit,
/// or a rebuild is pending) all stamps are ignored.
#[derive(Debug, Clone, Default)]
pub struct MnaSystem {
    /// System matrix A (row-major)
    a: Vec<f64>,
    /// Known vector z
    z: Vec<f64>,
    /// Solution vector x
    x: Vec<f64>,
    /// Matrix dimension
    size: usize,
    /// Number of node rows
    node_count: usize,
    /// LU decomposition of A (for efficient solving)
    lu: Vec<f64>,
    /// Pivot indices for LU decomposition
    pivots: Vec<usize>,
    assembled: bool,
    factored: bool,
    matrix_changed: bool,
    right_side_changed: bool,
}

impl MnaSystem {
    /// Create an absent (unassembled) system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed system for `node_count` nodes and `vs_count` sources.
    ///
    /// An empty circuit leaves the system absent.
    pub(crate) fn allocate(&mut self, node_count: usize, vs_count: usize) {
        let size = node_count + vs_count;
        self.node_count = node_count;
        self.size = size;
        self.factored = false;

        if size == 0 {
            self.a.clear();
            self.z.clear();
            self.x.clear();
            self.lu.clear();
            self.pivots.clear();
            self.assembled = false;
            self.matrix_changed = false;
            self.right_side_changed = false;
            return;
        }

        self.a = vec![0.0; size * size];
        self.z = vec![0.0; size];
        self.x = vec![0.0; size];
        self.lu = vec![0.0; size * size];
        self.pivots = (0..size).collect();
        self.assembled = true;
        // Force at least one factor/solve pass after a rebuild
        self.matrix_changed = true;
        self.right_side_changed = true;
    }

    /// Drop the assembled matrix; stamps are ignored until the next rebuild.
    pub(crate) fn invalidate(&mut self) {
        self.assembled = false;
        self.factored = false;
        self.matrix_changed = false;
        self.right_side_changed = false;
    }

    /// Whether a matrix is currently present.
    pub fn is_assembled(&self) -> bool {
        self.assembled
    }

    /// Whether a valid LU factorization is available.
    pub fn is_factored(&self) -> bool {
        self.factored
    }

    /// Matrix dimension (nodes + voltage sources).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of node rows.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of voltage-source rows.
    pub fn vsource_count(&self) -> usize {
        self.size - self.node_count
    }

    pub fn matrix_changed(&self) -> bool {
        self.matrix_changed
    }

    pub fn right_side_changed(&self) -> bool {
        self.right_side_changed
    }

    /// Whether another factor or solve pass is needed.
    pub fn is_dirty(&self) -> bool {
        self.matrix_changed || self.right_side_changed
    }

    /// Get matrix element at (row, col), zero when absent.
    pub fn entry(&self, row: usize, col: usize) -> f64 {
        if !self.assembled || row >= self.size || col >= self.size {
            return 0.0;
        }
        self.a[row * self.size + col]
    }

    /// Get known vector element, zero when absent.
    pub fn known(&self, row: usize) -> f64 {
        if !self.assembled || row >= self.size {
            return 0.0;
        }
        self.z[row]
    }

    /// The last computed solution.
    pub fn solution(&self) -> &[f64] {
        &self.x
    }

    /// Conductance of `r`, failing if it is not finite.
    pub fn conductance(r: f64) -> Result<f64> {
        let g = 1.0 / r;
        if g.is_finite() {
            Ok(g)
        } else {
            Err(MnaError::InvalidResistance { resistance: r })
        }
    }

    /// Add `x` into cell (a, b).
    ///
    /// If the potential of `b` changes by dV, the current into `a` changes by
    /// `x * dV`; the unit of `x` is Siemens.
    pub fn stamp_matrix(&mut self, a: Option<usize>, b: Option<usize>, x: f64) {
        let (Some(a), Some(b)) = (a, b) else {
            return;
        };
        if !self.assembled {
            return;
        }
        debug_assert!(a < self.size && b < self.size);
        self.a[a * self.size + b] += x;
        self.matrix_changed = true;
    }

    /// Add `x` into known row `i`.
    pub fn stamp_known(&mut self, i: Option<usize>, x: f64) {
        let Some(i) = i else {
            return;
        };
        if !self.assembled {
            return;
        }
        debug_assert!(i < self.size);
        self.z[i] += x;
        self.right_side_changed = true;
    }

    /// Change the potential of voltage source `num` by `x` volts.
    pub fn stamp_voltage_change(&mut self, num: Option<usize>, x: f64) {
        let row = num.map(|n| n + self.node_count);
        self.stamp_known(row, x);
    }

    /// Stamp a resistor of `r` ohms between two nodes.
    ///
    /// For a conductance G between nodes a and b:
    ///   A[a,a] += G
    ///   A[b,b] += G
    ///   A[a,b] -= G
    ///   A[b,a] -= G
    pub fn stamp_resistor(&mut self, a: Option<usize>, b: Option<usize>, r: f64) -> Result<()> {
        let g = Self::conductance(r)?;
        self.stamp_matrix(a, a, g);
        self.stamp_matrix(b, b, g);
        self.stamp_matrix(a, b, -g);
        self.stamp_matrix(b, a, -g);
        Ok(())
    }

    /// Stamp voltage source `num` of `v` volts between `pos` and `neg`.
    pub fn stamp_voltage_source(
        &mut self,
        pos: Option<usize>,
        neg: Option<usize>,
        num: Option<usize>,
        v: f64,
    ) {
        // Without a source row this would stamp plain conductances
        let Some(num) = num else {
            return;
        };
        let vs = Some(num + self.node_count);
        self.stamp_matrix(vs, neg, -1.0);
        self.stamp_matrix(vs, pos, 1.0);
        self.stamp_matrix(neg, vs, 1.0);
        self.stamp_matrix(pos, vs, -1.0);
        self.stamp_known(vs, v);
    }

    /// Stamp a current source of `i` amperes, drawn out of `pos` into `neg`.
    pub fn stamp_current_source(&mut self, pos: Option<usize>, neg: Option<usize>, i: f64) {
        self.stamp_known(pos, -i);
        self.stamp_known(neg, i);
    }

    /// Perform LU decomposition with partial pivoting.
    ///
    /// Clears the matrix-changed flag whether or not the factorization succeeds.
    pub(crate) fn factor(&mut self) -> Result<()> {
        self.matrix_changed = false;
        self.factored = false;
        if !self.assembled {
            return Ok(());
        }

        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < PIVOT_EPSILON || !max_val.is_finite() {
                return Err(MnaError::SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        self.factored = true;
        Ok(())
    }

    /// Solve against the known vector using the current factorization.
    ///
    /// Clears the right-side-changed flag. Fails without a factorization or
    /// when the result is not finite.
    pub(crate) fn solve(&mut self) -> Result<&[f64]> {
        self.right_side_changed = false;
        if !self.assembled {
            return Ok(&self.x);
        }
        if !self.factored {
            return Err(MnaError::SingularMatrix);
        }

        let n = self.size;

        // Apply pivot permutation to z
        for i in 0..n {
            self.x[i] = self.z[self.pivots[i]];
        }

        // Forward substitution (L * y = Pz)
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] /= self.lu[i * n + i];
        }

        if let Some(row) = self.x.iter().position(|v| !v.is_finite()) {
            return Err(MnaError::NonFiniteSolution { row });
        }

        Ok(&self.x)
    }
}

impl fmt::Display for MnaSystem {
    /// Tab-separated matrix rows followed by the known value of each row.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.assembled {
            return writeln!(f, "<no matrix>");
        }
        for row in 0..self.size {
            for col in 0..self.size {
                write!(f, "{}\t", self.a[row * self.size + col])?;
            }
            writeln!(f, "|\t{}", self.z[row])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn system(nodes: usize, sources: usize) -> MnaSystem {
        let mut sys = MnaSystem::new();
        sys.allocate(nodes, sources);
        sys
    }

    #[test]
    fn test_empty_system_is_absent() {
        let mut sys = system(0, 0);
        assert!(!sys.is_assembled());
        sys.stamp_matrix(Some(0), Some(0), 1.0);
        sys.stamp_known(Some(0), 1.0);
        assert!(!sys.is_dirty());
        assert!(sys.factor().is_ok());
    }

    #[test]
    fn test_resistor_stamp_cancellation() {
        let mut sys = system(2, 0);
        sys.stamp_resistor(Some(0), Some(1), 2.0).unwrap();
        let before: Vec<f64> = (0..4).map(|k| sys.entry(k / 2, k % 2)).collect();

        sys.stamp_resistor(Some(0), Some(1), 3.0).unwrap();
        sys.stamp_resistor(Some(0), Some(1), -3.0).unwrap();

        let after: Vec<f64> = (0..4).map(|k| sys.entry(k / 2, k % 2)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_ground_stamps_are_ignored() {
        let mut sys = system(1, 0);
        sys.stamp_resistor(Some(0), None, 4.0).unwrap();
        assert_relative_eq!(sys.entry(0, 0), 0.25);
        sys.stamp_known(None, 5.0);
        assert_eq!(sys.known(0), 0.0);
    }

    #[test]
    fn test_zero_resistance_is_rejected() {
        let mut sys = system(2, 0);
        let err = sys.stamp_resistor(Some(0), Some(1), 0.0).unwrap_err();
        assert_eq!(err, MnaError::InvalidResistance { resistance: 0.0 });
        assert_eq!(sys.entry(0, 0), 0.0);
    }

    #[test]
    fn test_voltage_source_pattern() {
        let mut sys = system(2, 1);
        sys.stamp_voltage_source(Some(0), Some(1), Some(0), 5.0);
        assert_eq!(sys.entry(2, 0), 1.0);
        assert_eq!(sys.entry(2, 1), -1.0);
        assert_eq!(sys.entry(0, 2), -1.0);
        assert_eq!(sys.entry(1, 2), 1.0);
        assert_eq!(sys.known(2), 5.0);

        sys.stamp_voltage_change(Some(0), -2.0);
        assert_eq!(sys.known(2), 3.0);
    }

    #[test]
    fn test_factor_and_solve_divider() {
        // 1A injected into node 0, 2 ohm to node 1, 2 ohm from node 1 to ground
        let mut sys = system(2, 0);
        sys.stamp_resistor(Some(0), Some(1), 2.0).unwrap();
        sys.stamp_resistor(Some(1), None, 2.0).unwrap();
        sys.stamp_current_source(None, Some(0), 1.0);

        sys.factor().unwrap();
        let x = sys.solve().unwrap().to_vec();
        assert_relative_eq!(x[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_eq!(sys.solution(), &x[..]);
        assert!(!sys.is_dirty());
    }

    #[test]
    fn test_singular_matrix() {
        let mut sys = system(2, 0);
        sys.stamp_resistor(Some(0), Some(1), 1.0).unwrap();
        assert_eq!(sys.factor(), Err(MnaError::SingularMatrix));
        assert!(!sys.is_factored());
        assert!(matches!(sys.solve(), Err(MnaError::SingularMatrix)));
    }
}
