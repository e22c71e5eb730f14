//! Electrical junctions and the union-find arena that merges them.

use std::fmt;

use super::types::NodeRef;

/// Merge priority of the ground node; it beats every ordinary node.
const GROUND_PRIORITY: u32 = u32::MAX;

/// An electrical junction.
///
/// Nodes are never destroyed when two terminals are wired together; one of
/// them becomes the representative of the merged set and the other is only
/// reachable through it.
#[derive(Debug, Clone)]
pub struct Node {
    potential: f64,
    index: Option<usize>,
    name: Option<String>,
    priority: u32,
    parent: usize,
}

impl Node {
    fn fresh(position: usize) -> Self {
        Self {
            potential: 0.0,
            index: None,
            name: None,
            priority: 0,
            parent: position,
        }
    }

    fn ground() -> Self {
        Self {
            potential: 0.0,
            index: None,
            name: Some("ground".to_string()),
            priority: GROUND_PRIORITY,
            parent: 0,
        }
    }

    /// Potential relative to ground, in volts.
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Row in the MNA matrix; `None` for ground and before assembly.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Debug name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_ground(&self) -> bool {
        self.priority == GROUND_PRIORITY
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("n");
        match self.index {
            Some(i) => write!(f, "[node {name}#{i}: {}V]", self.potential),
            None => write!(f, "[node {name}: {}V]", self.potential),
        }
    }
}

/// Old-position to new-position table produced by [`NodeArena::compact`].
#[derive(Debug)]
pub(crate) struct Remap {
    table: Vec<Option<NodeRef>>,
}

impl Remap {
    /// New reference for an old one; `None` if its set was not kept alive.
    pub(crate) fn get(&self, old: NodeRef) -> Option<NodeRef> {
        self.table.get(old.0).copied().flatten()
    }
}

/// Circuit-owned storage for every node, with union-find merging.
///
/// Ties between ordinary nodes go to the older one (lower position);
/// ground sits at position 0 and always wins.
#[derive(Debug, Clone)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::ground()],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate a fresh singleton node.
    pub(crate) fn alloc(&mut self) -> NodeRef {
        let position = self.nodes.len();
        self.nodes.push(Node::fresh(position));
        NodeRef(position)
    }

    /// Representative of the set containing `r`.
    pub(crate) fn find(&self, r: NodeRef) -> NodeRef {
        let mut position = r.0;
        while self.nodes[position].parent != position {
            position = self.nodes[position].parent;
        }
        NodeRef(position)
    }

    /// The representative node for `r`.
    pub(crate) fn get(&self, r: NodeRef) -> &Node {
        &self.nodes[self.find(r).0]
    }

    pub(crate) fn get_mut(&mut self, r: NodeRef) -> &mut Node {
        let root = self.find(r);
        &mut self.nodes[root.0]
    }

    pub(crate) fn ground(&self) -> &Node {
        &self.nodes[0]
    }

    /// Merge the sets of `a` and `b`, returning the surviving representative.
    pub(crate) fn union(&mut self, a: NodeRef, b: NodeRef) -> NodeRef {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }

        let (pa, pb) = (self.nodes[ra.0].priority, self.nodes[rb.0].priority);
        let (winner, loser) = if pa != pb {
            if pa > pb {
                (ra, rb)
            } else {
                (rb, ra)
            }
        } else if ra < rb {
            (ra, rb)
        } else {
            (rb, ra)
        };

        self.nodes[loser.0].parent = winner.0;
        if self.nodes[winner.0].name.is_none() {
            self.nodes[winner.0].name = self.nodes[loser.0].name.take();
        }
        winner
    }

    /// Drop every set not reachable from `live`, flatten the rest, and
    /// number the survivors contiguously in their original order.
    ///
    /// Returns the number of non-ground nodes and the table translating old
    /// references into new ones.
    pub(crate) fn compact(&mut self, live: impl IntoIterator<Item = NodeRef>) -> (usize, Remap) {
        let mut keep = vec![false; self.nodes.len()];
        keep[0] = true;
        for r in live {
            keep[self.find(r).0] = true;
        }

        let mut root_to_new = vec![None; self.nodes.len()];
        let mut fresh = Vec::with_capacity(self.nodes.len());
        for (position, kept) in keep.iter().enumerate() {
            if !kept {
                continue;
            }
            let new_position = fresh.len();
            let mut node = self.nodes[position].clone();
            node.parent = new_position;
            node.index = new_position.checked_sub(1);
            fresh.push(node);
            root_to_new[position] = Some(NodeRef(new_position));
        }

        let table = (0..self.nodes.len())
            .map(|position| root_to_new[self.find(NodeRef(position)).0])
            .collect();

        self.nodes = fresh;
        (self.nodes.len() - 1, Remap { table })
    }

    /// Write solved potentials; entry `i` belongs to matrix row `i`.
    pub(crate) fn write_potentials(&mut self, solution: &[f64]) {
        for node in self.nodes.iter_mut().skip(1) {
            if let Some(i) = node.index {
                node.potential = solution[i];
            }
        }
    }

    pub(crate) fn set_name(&mut self, r: NodeRef, name: String) {
        self.get_mut(r).name = Some(name);
    }

    /// Iterate over non-ground representatives.
    pub(crate) fn representatives(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(position, node)| node.parent == *position)
            .map(|(position, node)| (NodeRef(position), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_always_wins() {
        let mut arena = NodeArena::new();
        let a = arena.alloc();
        let b = arena.alloc();
        arena.union(a, b);
        let rep = arena.union(b, NodeRef::GROUND);
        assert!(rep.is_ground());
        assert!(arena.get(a).is_ground());
        assert_eq!(arena.get(a).index(), None);
        assert_eq!(arena.get(a).potential(), 0.0);
    }

    #[test]
    fn test_older_node_wins_tie() {
        let mut arena = NodeArena::new();
        let a = arena.alloc();
        let b = arena.alloc();
        assert_eq!(arena.union(b, a), a);
        assert_eq!(arena.find(b), a);
    }

    #[test]
    fn test_union_keeps_a_name() {
        let mut arena = NodeArena::new();
        let a = arena.alloc();
        let b = arena.alloc();
        arena.set_name(b, "vout".to_string());
        arena.union(a, b);
        assert_eq!(arena.get(a).name(), Some("vout"));
    }

    #[test]
    fn test_compact_drops_unreferenced_sets() {
        let mut arena = NodeArena::new();
        let a = arena.alloc();
        let dead = arena.alloc();
        let b = arena.alloc();
        let c = arena.alloc();
        arena.union(b, c);

        let (count, remap) = arena.compact([a, b, c]);
        assert_eq!(count, 2);
        assert_eq!(arena.len(), 3);
        assert_eq!(remap.get(dead), None);
        assert_eq!(remap.get(b), remap.get(c));

        let na = remap.get(a).unwrap();
        let nb = remap.get(b).unwrap();
        assert!(na < nb);
        assert_eq!(arena.get(na).index(), Some(0));
        assert_eq!(arena.get(nb).index(), Some(1));
        assert_eq!(remap.get(NodeRef::GROUND), Some(NodeRef::GROUND));
    }
}
