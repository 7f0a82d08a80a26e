//! Explicit connection table: source node → set of destinations.

use std::collections::{BTreeMap, BTreeSet};

use super::{Endpoint, NodeId};

/// Directed edges of a signal graph.
///
/// Deterministic iteration order, so topology built from it is reproducible.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    edges: BTreeMap<NodeId, BTreeSet<Endpoint>>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge; `false` if it already existed.
    pub fn connect(&mut self, from: NodeId, to: Endpoint) -> bool {
        self.edges.entry(from).or_default().insert(to)
    }

    /// Remove an edge; `false` if it was not there.
    pub fn disconnect(&mut self, from: NodeId, to: Endpoint) -> bool {
        let Some(set) = self.edges.get_mut(&from) else {
            return false;
        };
        let removed = set.remove(&to);
        if set.is_empty() {
            self.edges.remove(&from);
        }
        removed
    }

    /// Remove every outgoing edge of `from`, returning them.
    pub fn disconnect_all(&mut self, from: NodeId) -> BTreeSet<Endpoint> {
        self.edges.remove(&from).unwrap_or_default()
    }

    /// Remove every edge that starts or ends at `node`.
    pub fn remove_node(&mut self, node: NodeId) {
        self.edges.remove(&node);
        self.edges.retain(|_, set| {
            set.retain(|ep| ep.node() != node);
            !set.is_empty()
        });
    }

    pub fn contains(&self, from: NodeId, to: Endpoint) -> bool {
        self.edges.get(&from).is_some_and(|set| set.contains(&to))
    }

    pub fn destinations(&self, from: NodeId) -> impl Iterator<Item = Endpoint> + '_ {
        self.edges.get(&from).into_iter().flatten().copied()
    }

    pub fn sources(&self, to: Endpoint) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .iter()
            .filter(move |(_, set)| set.contains(&to))
            .map(|(from, _)| *from)
    }

    /// Every edge as `(source, destination)`.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Endpoint)> + '_ {
        self.edges
            .iter()
            .flat_map(|(from, set)| set.iter().map(move |to| (*from, *to)))
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ParamRef;

    const A: NodeId = NodeId(1);
    const B: NodeId = NodeId(2);
    const C: NodeId = NodeId(3);

    #[test]
    fn connect_is_set_like() {
        let mut r = Routes::new();
        assert!(r.connect(A, Endpoint::Input(B)));
        assert!(!r.connect(A, Endpoint::Input(B)));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn disconnect_missing_edge_is_harmless() {
        let mut r = Routes::new();
        assert!(!r.disconnect(A, Endpoint::Input(B)));
        r.connect(A, Endpoint::Input(B));
        assert!(r.disconnect(A, Endpoint::Input(B)));
        assert!(r.is_empty());
    }

    #[test]
    fn remove_node_drops_both_directions() {
        let mut r = Routes::new();
        r.connect(A, Endpoint::Input(B));
        r.connect(B, Endpoint::Input(C));
        r.connect(C, Endpoint::Param(ParamRef::detune(B)));
        r.connect(A, Endpoint::Input(C));
        r.remove_node(B);
        let edges: Vec<_> = r.iter().collect();
        assert_eq!(edges, vec![(A, Endpoint::Input(C))]);
    }

    #[test]
    fn sources_of_an_input() {
        let mut r = Routes::new();
        r.connect(A, Endpoint::Input(C));
        r.connect(B, Endpoint::Input(C));
        r.connect(B, Endpoint::Param(ParamRef::q(C)));
        let sources: Vec<_> = r.sources(Endpoint::Input(C)).collect();
        assert_eq!(sources, vec![A, B]);
        assert_eq!(r.disconnect_all(B).len(), 2);
        assert_eq!(r.sources(Endpoint::Input(C)).count(), 1);
    }
}
