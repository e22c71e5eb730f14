//! Core handle types for circuit bookkeeping.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A reference to a node in a circuit's node arena.
/// Position 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub(crate) usize);

impl NodeRef {
    /// The ground node (always position 0).
    pub const GROUND: NodeRef = NodeRef(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// A generation-checked identifier for a component registered in a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId {
    pub(crate) circuit: u64,
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.slot)
    }
}

/// A typed handle to a device of kind `D` owned by a circuit.
///
/// Returned by [`crate::Circuit::add`]; the device itself lives inside the
/// circuit and is reached through [`crate::Circuit::get`].
pub struct Handle<D> {
    id: ComponentId,
    marker: PhantomData<fn() -> D>,
}

impl<D> Handle<D> {
    pub(crate) fn new(id: ComponentId) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// The untyped component id.
    pub fn id(&self) -> ComponentId {
        self.id
    }
}

impl<D> Clone for Handle<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Handle<D> {}

impl<D> PartialEq for Handle<D> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<D> Eq for Handle<D> {}

impl<D> Hash for Handle<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<D> fmt::Debug for Handle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id).finish()
    }
}

impl<D> From<Handle<D>> for ComponentId {
    fn from(handle: Handle<D>) -> Self {
        handle.id
    }
}

/// Identifier of a registered pre/post step hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) usize);
