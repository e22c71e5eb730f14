//! Per-component node and voltage-source slots.

use crate::circuit::NodeRef;

use super::vsource::VSource;

/// The node and voltage-source slots a component receives when it is added
/// to a circuit.
///
/// Matrix rows and node potentials are cached here by the circuit after each
/// rebuild and solve, so devices can read their own terminal state without a
/// reference back to the circuit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Terminals {
    attached: bool,
    nodes: Vec<NodeRef>,
    indices: Vec<Option<usize>>,
    potentials: Vec<f64>,
    vsources: Vec<VSource>,
}

impl Terminals {
    pub(crate) fn attach(&mut self, nodes: Vec<NodeRef>, vs_count: usize) {
        self.indices = vec![None; nodes.len()];
        self.potentials = vec![0.0; nodes.len()];
        self.nodes = nodes;
        self.vsources = vec![VSource::default(); vs_count];
        self.attached = true;
    }

    pub(crate) fn detach(&mut self) {
        *self = Self::default();
    }

    /// Whether the owning component has been added to a circuit.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Number of node slots.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, slot: usize) -> Option<NodeRef> {
        self.nodes.get(slot).copied()
    }

    pub(crate) fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    /// Matrix row of the node in `slot`; `None` for ground or before assembly.
    pub fn index(&self, slot: usize) -> Option<usize> {
        self.indices.get(slot).copied().flatten()
    }

    /// Potential of the node in `slot` after the last solve (0 if absent).
    pub fn potential(&self, slot: usize) -> f64 {
        self.potentials.get(slot).copied().unwrap_or(0.0)
    }

    /// Matrix row of the positive terminal (slot 0).
    pub fn pos(&self) -> Option<usize> {
        self.index(0)
    }

    /// Matrix row of the negative terminal (slot 1).
    pub fn neg(&self) -> Option<usize> {
        self.index(1)
    }

    /// Potential across the port, positive when slot 0 is higher.
    pub fn u(&self) -> f64 {
        self.potential(0) - self.potential(1)
    }

    pub fn vsource(&self, i: usize) -> Option<&VSource> {
        self.vsources.get(i)
    }

    pub fn vsources(&self) -> &[VSource] {
        &self.vsources
    }

    pub(crate) fn vsource_mut(&mut self, i: usize) -> Option<&mut VSource> {
        self.vsources.get_mut(i)
    }

    pub(crate) fn vsources_mut(&mut self) -> &mut [VSource] {
        &mut self.vsources
    }

    /// Point `slot` at a (compacted) node with its matrix row and potential.
    pub(crate) fn relink(&mut self, slot: usize, node: NodeRef, index: Option<usize>, potential: f64) {
        self.nodes[slot] = node;
        self.indices[slot] = index;
        self.potentials[slot] = potential;
    }

    /// Refresh cached potentials from the circuit's nodes.
    pub(crate) fn refresh(&mut self, potential_of: impl Fn(NodeRef) -> f64) {
        for (cached, node) in self.potentials.iter_mut().zip(&self.nodes) {
            *cached = potential_of(*node);
        }
    }
}
