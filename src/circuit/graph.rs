//! The circuit: component ownership, wiring, assembly and stepping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, debug_span, trace, warn};

use super::config::CircuitConfig;
use super::node::{Node, NodeArena};
use super::types::{ComponentId, Handle, HookId, NodeRef};
use crate::components::{Component, CurrentSource, Device, DynamicResistor, VoltageSource};
use crate::error::{MnaError, Result};
use crate::solver::MnaSystem;

static NEXT_CIRCUIT_ID: AtomicU64 = AtomicU64::new(0);

type Hook = Box<dyn FnMut(f64)>;

/// Outcome of one [`Circuit::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Whether the last solve of the tick succeeded. A failed solve keeps
    /// the previous potentials and currents.
    pub solved: bool,
    /// Substeps run this tick.
    pub substeps: usize,
    /// Whether the system was clean when the tick ended; `false` means the
    /// substep budget ran out first.
    pub converged: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    component: Option<Component>,
}

/// A simulated circuit.
///
/// Components are added with [`Circuit::add`], wired with
/// [`Circuit::connect`] and [`Circuit::ground`], and advanced with
/// [`Circuit::step`] once per external tick. Topology or parameter changes
/// made through [`Circuit::get_mut`] mark the system for a full rebuild at
/// the next step; [`Circuit::adjust`] and the `set_*` helpers patch the
/// assembled system in place instead.
pub struct Circuit {
    id: u64,
    config: CircuitConfig,
    nodes: NodeArena,
    slots: Vec<Slot>,
    free: Vec<usize>,
    system: MnaSystem,
    components_changed: bool,
    connectivity_changed: bool,
    solved: bool,
    pre_hooks: Vec<(HookId, Hook)>,
    post_hooks: Vec<(HookId, Hook)>,
    next_hook: usize,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self::with_config(CircuitConfig::default())
    }

    pub fn with_config(config: CircuitConfig) -> Self {
        Self {
            id: NEXT_CIRCUIT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            nodes: NodeArena::new(),
            slots: Vec::new(),
            free: Vec::new(),
            system: MnaSystem::new(),
            components_changed: false,
            connectivity_changed: false,
            solved: true,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            next_hook: 0,
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CircuitConfig {
        &mut self.config
    }

    /// The assembled system, for inspection.
    pub fn system(&self) -> &MnaSystem {
        &self.system
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the last solve succeeded.
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Whether a rebuild is pending.
    pub fn needs_rebuild(&self) -> bool {
        self.components_changed || self.connectivity_changed
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        let circuit = self.id;
        self.slots.iter().enumerate().filter_map(move |(slot, s)| {
            s.component.as_ref().map(|c| {
                let id = ComponentId {
                    circuit,
                    slot,
                    generation: s.generation,
                };
                (id, c)
            })
        })
    }

    fn components_mut(slots: &mut [Slot]) -> impl Iterator<Item = &mut Component> {
        slots.iter_mut().filter_map(|s| s.component.as_mut())
    }

    // ============ Ownership ============

    /// Take ownership of `device`, giving it fresh unconnected nodes and its
    /// voltage-source unknowns.
    pub fn add<D: Device>(&mut self, mut device: D) -> Handle<D> {
        let nodes = (0..D::NODE_COUNT).map(|_| self.nodes.alloc()).collect();
        device.terminals_mut().attach(nodes, D::VS_COUNT);
        device.added();
        let component: Component = device.into();

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].component = Some(component);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    component: Some(component),
                });
                self.slots.len() - 1
            }
        };

        let id = ComponentId {
            circuit: self.id,
            slot,
            generation: self.slots[slot].generation,
        };
        trace!(component = %id, "added component");
        self.mark_components_changed();
        Handle::new(id)
    }

    /// Detach a device and hand it back. Its handle becomes stale; the
    /// returned device can be added again (to this or another circuit).
    pub fn remove<D: Device>(&mut self, handle: Handle<D>) -> Result<D> {
        let id = handle.id();
        if D::downcast(self.component(id)?).is_none() {
            return Err(MnaError::KindMismatch { component: id });
        }

        let slot = &mut self.slots[id.slot];
        let component = slot
            .component
            .take()
            .ok_or(MnaError::NotInCircuit { component: id })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.mark_components_changed();

        let mut device = D::from_component(component).map_err(|_| MnaError::KindMismatch { component: id })?;
        device.terminals_mut().detach();
        trace!(component = %id, "removed component");
        Ok(device)
    }

    fn component(&self, id: ComponentId) -> Result<&Component> {
        if id.circuit != self.id {
            return Err(MnaError::NotInCircuit { component: id });
        }
        self.slots
            .get(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.component.as_ref())
            .ok_or(MnaError::NotInCircuit { component: id })
    }

    fn lookup_mut(slots: &mut [Slot], circuit: u64, id: ComponentId) -> Result<&mut Component> {
        if id.circuit != circuit {
            return Err(MnaError::NotInCircuit { component: id });
        }
        slots
            .get_mut(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.component.as_mut())
            .ok_or(MnaError::NotInCircuit { component: id })
    }

    /// Borrow a device.
    pub fn get<D: Device>(&self, handle: Handle<D>) -> Result<&D> {
        let id = handle.id();
        D::downcast(self.component(id)?).ok_or(MnaError::KindMismatch { component: id })
    }

    /// Borrow a device for editing its parameters.
    ///
    /// Schedules a full rebuild at the next step.
    pub fn get_mut<D: Device>(&mut self, handle: Handle<D>) -> Result<&mut D> {
        let id = handle.id();
        if D::downcast(self.component(id)?).is_none() {
            return Err(MnaError::KindMismatch { component: id });
        }
        self.mark_components_changed();
        let component = Self::lookup_mut(&mut self.slots, self.id, id)?;
        D::downcast_mut(component).ok_or(MnaError::KindMismatch { component: id })
    }

    /// Edit a device through its incremental setters, without scheduling a
    /// rebuild. The closure receives the live system to stamp deltas into.
    pub fn adjust<D, R, F>(&mut self, handle: Handle<D>, f: F) -> Result<R>
    where
        D: Device,
        F: FnOnce(&mut D, &mut MnaSystem) -> Result<R>,
    {
        let id = handle.id();
        let component = Self::lookup_mut(&mut self.slots, self.id, id)?;
        let device = D::downcast_mut(component).ok_or(MnaError::KindMismatch { component: id })?;
        f(device, &mut self.system)
    }

    pub fn set_resistance(&mut self, handle: Handle<DynamicResistor>, resistance: f64) -> Result<()> {
        self.adjust(handle, |r, sys| r.set_resistance(sys, resistance))
    }

    pub fn set_potential(&mut self, handle: Handle<VoltageSource>, potential: f64) -> Result<()> {
        self.adjust(handle, |vs, sys| {
            vs.set_potential(sys, potential);
            Ok(())
        })
    }

    pub fn set_current(&mut self, handle: Handle<CurrentSource>, current: f64) -> Result<()> {
        self.adjust(handle, |cs, sys| {
            cs.set_current(sys, current);
            Ok(())
        })
    }

    // ============ Wiring ============

    fn terminal_node(&self, id: ComponentId, slot: usize) -> Result<NodeRef> {
        let terminals = self.component(id)?.terminals();
        terminals.node(slot).ok_or(MnaError::InvalidSlot {
            component: id,
            slot,
            count: terminals.len(),
        })
    }

    /// Join terminal `a_slot` of `a` and terminal `b_slot` of `b` into one node.
    pub fn connect(
        &mut self,
        a: impl Into<ComponentId>,
        a_slot: usize,
        b: impl Into<ComponentId>,
        b_slot: usize,
    ) -> Result<()> {
        let na = self.terminal_node(a.into(), a_slot)?;
        let nb = self.terminal_node(b.into(), b_slot)?;
        self.nodes.union(na, nb);
        self.mark_connectivity_changed();
        Ok(())
    }

    /// Tie terminal `slot` of `component` to ground.
    pub fn ground(&mut self, component: impl Into<ComponentId>, slot: usize) -> Result<()> {
        let node = self.terminal_node(component.into(), slot)?;
        self.nodes.union(node, NodeRef::GROUND);
        self.mark_connectivity_changed();
        Ok(())
    }

    /// Give the node behind a terminal a debug name.
    pub fn name_node(&mut self, component: impl Into<ComponentId>, slot: usize, name: impl Into<String>) -> Result<()> {
        let node = self.terminal_node(component.into(), slot)?;
        self.nodes.set_name(node, name.into());
        Ok(())
    }

    /// The node behind a terminal.
    pub fn node(&self, component: impl Into<ComponentId>, slot: usize) -> Result<&Node> {
        let node = self.terminal_node(component.into(), slot)?;
        Ok(self.nodes.get(node))
    }

    /// Potential of the node behind a terminal, in volts.
    pub fn potential(&self, component: impl Into<ComponentId>, slot: usize) -> Result<f64> {
        self.node(component, slot).map(Node::potential)
    }

    pub fn ground_node(&self) -> &Node {
        self.nodes.ground()
    }

    /// Whether no terminal reaches ground.
    pub fn is_floating(&self) -> bool {
        !self.components().any(|(_, c)| {
            c.terminals()
                .nodes()
                .iter()
                .any(|&n| self.nodes.find(n).is_ground())
        })
    }

    fn mark_components_changed(&mut self) {
        self.components_changed = true;
        self.system.invalidate();
    }

    fn mark_connectivity_changed(&mut self) {
        self.connectivity_changed = true;
        self.system.invalidate();
    }

    // ============ Assembly ============

    /// Renumber nodes and sources, allocate the system and stamp every
    /// component into it.
    pub fn build_matrix(&mut self) -> Result<()> {
        let live: Vec<NodeRef> = self
            .components()
            .flat_map(|(_, c)| c.terminals().nodes().to_vec())
            .collect();
        let (node_count, remap) = self.nodes.compact(live);

        let nodes = &self.nodes;
        let mut vs_count = 0;
        for component in Self::components_mut(&mut self.slots) {
            let terminals = component.terminals_mut();
            for slot in 0..terminals.len() {
                let Some(new) = terminals.node(slot).and_then(|old| remap.get(old)) else {
                    continue;
                };
                let node = nodes.get(new);
                terminals.relink(slot, new, node.index(), node.potential());
            }
            for vs in terminals.vsources_mut() {
                vs.set_index(Some(vs_count));
                vs_count += 1;
            }
        }

        self.components_changed = false;
        self.connectivity_changed = false;
        self.system.allocate(node_count, vs_count);
        if !self.system.is_assembled() {
            self.solved = true;
        }

        let system = &mut self.system;
        let stamped = Self::components_mut(&mut self.slots).try_for_each(|c| c.stamp(system));
        if let Err(err) = stamped {
            self.mark_components_changed();
            return Err(err);
        }

        debug!(
            nodes = node_count,
            vsources = vs_count,
            components = self.len(),
            "assembled MNA system"
        );
        trace!("matrix:\n{}", self.system);
        Ok(())
    }

    fn factor_matrix(&mut self) {
        if let Err(err) = self.system.factor() {
            warn!(size = self.system.size(), %err, "factorization failed");
        }
    }

    fn compute_result(&mut self) {
        if !self.system.is_assembled() {
            return;
        }
        let node_count = self.system.node_count();
        let solution = match self.system.solve() {
            Ok(x) => x,
            Err(err) => {
                warn!(%err, "solve failed, keeping previous outputs");
                self.solved = false;
                return;
            }
        };

        self.nodes.write_potentials(solution);
        for component in Self::components_mut(&mut self.slots) {
            for vs in component.terminals_mut().vsources_mut() {
                if let Some(i) = vs.index() {
                    vs.set_current(-solution[node_count + i]);
                }
            }
        }
        self.solved = true;

        let nodes = &self.nodes;
        for component in Self::components_mut(&mut self.slots) {
            component.terminals_mut().refresh(|n| nodes.get(n).potential());
        }
    }

    // ============ Stepping ============

    /// Advance the simulation by `dt` seconds.
    ///
    /// Rebuilds if needed, runs every device's pre-step, then alternates
    /// solving and nonlinear refinement until the system is clean or the
    /// substep budget is spent, and finally commits device history.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(MnaError::InvalidTimeStep { dt });
        }
        let _span = debug_span!("step", dt).entered();

        if self.needs_rebuild() {
            self.build_matrix()?;
        }

        for (_, hook) in self.pre_hooks.iter_mut() {
            hook(dt);
        }
        let system = &mut self.system;
        let prepared = Self::components_mut(&mut self.slots).try_for_each(|c| c.pre_step(dt, system));
        self.abandon_step_on_error(prepared)?;

        let slack = self.config.slack;
        let mut substeps = 0;
        while substeps < self.config.max_sub_steps && self.system.is_dirty() {
            if self.system.matrix_changed() {
                self.factor_matrix();
            }
            self.compute_result();
            let system = &mut self.system;
            let refined =
                Self::components_mut(&mut self.slots).try_for_each(|c| c.sim_step(system, slack));
            self.abandon_step_on_error(refined)?;
            substeps += 1;
        }

        let converged = !self.system.is_dirty();
        if !converged {
            debug!(substeps, "substep budget exhausted before convergence");
        }

        for component in Self::components_mut(&mut self.slots) {
            component.post_step(dt);
        }
        for (_, hook) in self.post_hooks.iter_mut() {
            hook(dt);
        }

        Ok(StepReport {
            solved: self.solved,
            substeps,
            converged,
        })
    }

    /// A device that failed mid-tick may have stamped only part of its
    /// update, so the system is discarded and rebuilt on the next step.
    fn abandon_step_on_error(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = result {
            warn!(error = %err, "step aborted, system will be rebuilt");
            self.mark_components_changed();
            return Err(err);
        }
        Ok(())
    }

    fn next_hook_id(&mut self) -> HookId {
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        id
    }

    /// Run `hook(dt)` at the start of every step, before device pre-steps.
    pub fn on_pre_step(&mut self, hook: impl FnMut(f64) + 'static) -> HookId {
        let id = self.next_hook_id();
        self.pre_hooks.push((id, Box::new(hook)));
        id
    }

    /// Run `hook(dt)` at the end of every step, after device post-steps.
    pub fn on_post_step(&mut self, hook: impl FnMut(f64) + 'static) -> HookId {
        let id = self.next_hook_id();
        self.post_hooks.push((id, Box::new(hook)));
        id
    }

    /// Deregister a hook; returns whether it was registered.
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let before = self.pre_hooks.len() + self.post_hooks.len();
        self.pre_hooks.retain(|(h, _)| *h != id);
        self.post_hooks.retain(|(h, _)| *h != id);
        before != self.pre_hooks.len() + self.post_hooks.len()
    }

    // ============ Diagnostics ============

    /// Render the circuit as a Graphviz graph.
    pub fn to_dot(&self) -> String {
        self.dot().to_string()
    }

    /// Graphviz view of the circuit, for writing straight into a formatter.
    pub fn dot(&self) -> Dot<'_> {
        Dot(self)
    }
}

/// [`Display`](fmt::Display) adapter rendering a [`Circuit`] as a Graphviz
/// graph: one point per node, one box per component, and one edge per
/// terminal (red for the first, blue for the rest).
pub struct Dot<'a>(&'a Circuit);

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let circuit = self.0;
        writeln!(f, "graph {{")?;
        writeln!(f, "\tgraph [splines=ortho];")?;
        writeln!(f, "\tnode [fontsize=8];")?;

        let mut seen = Vec::new();
        for (_, component) in circuit.components() {
            for &node in component.terminals().nodes() {
                let root = circuit.nodes.find(node);
                if !seen.contains(&root) {
                    seen.push(root);
                }
            }
        }
        for root in &seen {
            let node = circuit.nodes.get(*root);
            let label = node.name().map_or_else(|| root.to_string(), str::to_string);
            writeln!(f, "\t\"{root}\" [shape=point xlabel=\"{label}\"];")?;
        }

        for (id, component) in circuit.components() {
            writeln!(f, "\t\"{id}\" [shape=box label=\"{}\"];", component.kind())?;
            for (slot, &node) in component.terminals().nodes().iter().enumerate() {
                let color = if slot == 0 { "red" } else { "blue" };
                let root = circuit.nodes.find(node);
                writeln!(f, "\t\"{id}\" -- \"{root}\" [color={color}];")?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("components", &self.len())
            .field("nodes", &self.nodes.len())
            .field("needs_rebuild", &self.needs_rebuild())
            .field("solved", &self.solved)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "circuit #{} ({} components)", self.id, self.len())?;
        for (id, component) in self.components() {
            writeln!(f, "  {id}: {component}")?;
        }
        for (_, node) in self.nodes.representatives() {
            writeln!(f, "  {node}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Capacitor, Resistor};
    use approx::assert_relative_eq;

    #[test]
    fn test_add_allocates_fresh_nodes() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        let terminals = circuit.get(r).unwrap().terminals();
        assert!(terminals.is_attached());
        assert_ne!(terminals.node(0), terminals.node(1));
        assert!(circuit.needs_rebuild());
    }

    #[test]
    fn test_connect_then_build_numbers_nodes() {
        let mut circuit = Circuit::new();
        let a = circuit.add(Resistor::new(1.0));
        let b = circuit.add(Resistor::new(2.0));
        circuit.connect(a, 1, b, 0).unwrap();
        circuit.ground(b, 1).unwrap();
        circuit.build_matrix().unwrap();

        assert_eq!(circuit.system().node_count(), 2);
        assert_eq!(circuit.system().size(), 2);
        assert!(!circuit.needs_rebuild());
        assert_eq!(circuit.node(a, 1).unwrap().index(), circuit.node(b, 0).unwrap().index());
        assert_eq!(circuit.node(b, 1).unwrap().index(), None);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        let removed = circuit.remove(r).unwrap();
        assert!(!removed.terminals().is_attached());
        assert!(matches!(circuit.get(r), Err(MnaError::NotInCircuit { .. })));

        let again = circuit.add(removed);
        assert_ne!(again, r);
        assert!(circuit.get(again).is_ok());
    }

    #[test]
    fn test_handle_from_other_circuit_is_rejected() {
        let mut one = Circuit::new();
        let two = Circuit::new();
        let r = one.add(Resistor::new(1.0));
        assert!(matches!(two.get(r), Err(MnaError::NotInCircuit { .. })));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        let wrong: Handle<Capacitor> = Handle::new(r.id());
        assert!(matches!(circuit.get(wrong), Err(MnaError::KindMismatch { .. })));
    }

    #[test]
    fn test_invalid_slot() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        let err = circuit.ground(r, 2).unwrap_err();
        assert!(matches!(err, MnaError::InvalidSlot { slot: 2, count: 2, .. }));
    }

    #[test]
    fn test_get_mut_schedules_rebuild() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        circuit.ground(r, 1).unwrap();
        circuit.build_matrix().unwrap();
        assert!(!circuit.needs_rebuild());

        circuit.get_mut(r).unwrap().resistance = 4.0;
        assert!(circuit.needs_rebuild());
        assert!(!circuit.system().is_assembled());
        circuit.build_matrix().unwrap();
        assert_relative_eq!(circuit.system().entry(0, 0), 0.25);
    }

    #[test]
    fn test_dot_lists_every_component() {
        let mut circuit = Circuit::new();
        let r = circuit.add(Resistor::new(1.0));
        circuit.ground(r, 1).unwrap();
        let dot = circuit.to_dot();
        assert!(dot.starts_with("graph {"));
        assert!(dot.contains("label=\"resistor\""));
        assert!(dot.contains("GND"));
        assert!(dot.ends_with("}\n"));
        assert_eq!(format!("{}", circuit.dot()), dot);
    }
}
