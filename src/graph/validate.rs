//! Cycle validation for submitted graphs.
//!
//! A workflow graph must be acyclic outside of declared iterative
//! constructs: cycles wholly contained in a `loop`/`for_each`/`parallel`
//! sub-workflow are intentional and skipped. Everything else blocks
//! compilation with the full cycle path.

use std::collections::HashMap;

use crate::{
    Result, SegflowError,
    graph::WorkflowGraph,
    model::NodeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

pub struct CycleValidator;

impl CycleValidator {
    /// Depth-first search with a recursion stack over the validation
    /// adjacency (intra-construct edges excluded). A back-edge fails with
    /// [`SegflowError::IllegalCycle`] carrying the ordered cycle path.
    ///
    /// The search runs on an explicit stack, so adversarially deep graphs
    /// cannot overflow the call stack.
    pub fn validate(graph: &WorkflowGraph) -> Result<()> {
        let mut mark: HashMap<NodeId, Mark> = graph.node_ids().into_iter().map(|id| (id, Mark::White)).collect();
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();

        for start in graph.node_ids() {
            if mark[&start] != Mark::White {
                continue;
            }

            let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();
            mark.insert(start.clone(), Mark::Gray);
            let succs = Self::successors(graph, &start);
            stack.push((start, succs, 0));

            while let Some(frame) = stack.last_mut() {
                if frame.2 >= frame.1.len() {
                    let done = frame.0.clone();
                    stack.pop();
                    mark.insert(done, Mark::Black);
                    continue;
                }

                let next = frame.1[frame.2].clone();
                frame.2 += 1;
                let current = frame.0.clone();

                match mark[&next] {
                    Mark::White => {
                        parent.insert(next.clone(), current);
                        mark.insert(next.clone(), Mark::Gray);
                        let next_succs = Self::successors(graph, &next);
                        stack.push((next, next_succs, 0));
                    }
                    Mark::Gray => {
                        return Err(SegflowError::IllegalCycle {
                            path: Self::cycle_path(&current, &next, &parent),
                        });
                    }
                    Mark::Black => {}
                }
            }
        }
        Ok(())
    }

    /// Kahn's-algorithm topological ordering over the validation adjacency.
    ///
    /// Exposed for diagnostics. An incomplete ordering after [`validate`]
    /// has passed is a defensive-bug signal, reported as an internal error
    /// rather than a user error.
    ///
    /// [`validate`]: CycleValidator::validate
    pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<NodeId>> {
        let ids = graph.node_ids();
        let mut indegree: HashMap<NodeId, usize> = ids.iter().cloned().map(|id| (id, 0)).collect();
        for id in ids.iter() {
            for succ in Self::successors(graph, id) {
                if let Some(d) = indegree.get_mut(&succ) {
                    *d += 1;
                }
            }
        }

        let mut ready: Vec<NodeId> = ids.iter().filter(|id| indegree[*id] == 0).cloned().collect();
        let mut order = Vec::with_capacity(ids.len());
        while let Some(id) = ready.pop() {
            for succ in Self::successors(graph, &id) {
                if let Some(d) = indegree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(succ);
                    }
                }
            }
            order.push(id);
        }

        if order.len() != ids.len() {
            return Err(SegflowError::Internal(format!(
                "topological ordering covered {} of {} nodes on a validated graph",
                order.len(),
                ids.len()
            )));
        }
        Ok(order)
    }

    /// Successors over the validation adjacency: edges whose endpoints share
    /// an enclosing iterative construct are excluded.
    fn successors(
        graph: &WorkflowGraph,
        id: &str,
    ) -> Vec<NodeId> {
        graph
            .outgoing(id)
            .into_iter()
            .filter(|e| !graph.share_iterative_container(&e.source, &e.target))
            .map(|e| e.target.clone())
            .collect()
    }

    /// Reconstruct the ordered cycle `[v, ..., u, v]` from the parent chain
    /// recorded during the search, where `u -> v` is the back-edge.
    fn cycle_path(
        from: &str,
        to: &str,
        parent: &HashMap<NodeId, NodeId>,
    ) -> Vec<NodeId> {
        let mut path = vec![from.to_string()];
        let mut current = from.to_string();
        while current != to {
            match parent.get(&current) {
                Some(p) => {
                    current = p.clone();
                    path.push(current.clone());
                }
                None => break,
            }
        }
        path.reverse();
        path.push(to.to_string());
        path
    }
}
