use std::collections::HashMap;

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    Result, SegflowError,
    model::{EdgeKind, EdgeModel, GraphModel, NodeId, NodeModel},
};

/// Runtime workflow representation as a directed graph.
///
/// Nodes are inserted in declaration order and adjacency queries return
/// neighbors sorted by declaration index, so traversals are deterministic
/// regardless of the order edges were supplied in. This is what makes
/// compiled plans content-addressable.
pub struct WorkflowGraph {
    graph: DiGraph<NodeModel, EdgeModel>,
    index: HashMap<NodeId, NodeIndex>,
    /// declaration order of each node id, used to sort adjacency
    order: HashMap<NodeId, usize>,
}

impl WorkflowGraph {
    /// get node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeModel> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// declaration index of a node id
    pub fn declaration_index(
        &self,
        id: &str,
    ) -> usize {
        self.order.get(id).copied().unwrap_or(usize::MAX)
    }

    /// all node ids in declaration order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.index.keys().cloned().collect();
        ids.sort_by_key(|id| self.declaration_index(id));
        ids
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Root nodes: no incoming edges, in declaration order. Falls back to
    /// the first declared node when every node has an incoming edge.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|idx| self.graph.neighbors_directed(*idx, Direction::Incoming).count() == 0)
            .map(|idx| self.graph[idx].id.clone())
            .collect();
        roots.sort_by_key(|id| self.declaration_index(id));

        if roots.is_empty() {
            if let Some(first) = self.graph.node_indices().map(|idx| self.graph[idx].id.clone()).min_by_key(|id| self.declaration_index(id)) {
                roots.push(first);
            }
        }
        roots
    }

    /// Outgoing edges of a node, sorted by target declaration index.
    pub fn outgoing(
        &self,
        id: &str,
    ) -> Vec<&EdgeModel> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&EdgeModel> = self.graph.edges_directed(*idx, Direction::Outgoing).map(|e| e.weight()).collect();
        edges.sort_by_key(|e| self.declaration_index(&e.target));
        edges
    }

    /// Incoming edges of a node, sorted by source declaration index.
    pub fn incoming(
        &self,
        id: &str,
    ) -> Vec<&EdgeModel> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&EdgeModel> = self.graph.edges_directed(*idx, Direction::Incoming).map(|e| e.weight()).collect();
        edges.sort_by_key(|e| self.declaration_index(&e.source));
        edges
    }

    /// Number of non-HITL incoming edges; a count above one marks a merge point.
    pub fn merge_degree(
        &self,
        id: &str,
    ) -> usize {
        self.incoming(id).iter().filter(|e| e.kind != EdgeKind::Hitl).count()
    }

    /// Chain of enclosing iterative constructs for a node, nearest first.
    pub fn containers(
        &self,
        id: &str,
    ) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break; // malformed parent loop, stop walking
            }
            current = self.node(&parent).and_then(|n| n.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// Whether two nodes share an enclosing iterative construct. Edges
    /// between such nodes carry intentional cycles and are exempt from
    /// cycle validation.
    pub fn share_iterative_container(
        &self,
        a: &str,
        b: &str,
    ) -> bool {
        let ca = self.containers(a);
        if ca.is_empty() {
            return false;
        }
        let cb = self.containers(b);
        ca.iter().any(|c| cb.contains(c))
    }
}

impl TryFrom<&GraphModel> for WorkflowGraph {
    type Error = SegflowError;

    fn try_from(model: &GraphModel) -> Result<Self> {
        model.validate()?;

        let mut graph: DiGraph<NodeModel, EdgeModel> = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = HashMap::new();

        for (pos, node) in model.nodes.iter().enumerate() {
            let idx = graph.add_node(node.clone());
            index.insert(node.id.clone(), idx);
            order.insert(node.id.clone(), pos);
        }
        for edge in model.edges.iter() {
            let source = index.get(&edge.source).ok_or(SegflowError::Graph(format!("source node {} not found", edge.source)))?;
            let target = index.get(&edge.target).ok_or(SegflowError::Graph(format!("target node {} not found", edge.target)))?;
            graph.add_edge(*source, *target, edge.clone());
        }
        Ok(Self {
            graph,
            index,
            order,
        })
    }
}
