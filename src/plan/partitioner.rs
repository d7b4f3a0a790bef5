//! Graph partitioning: compiling a validated workflow graph into a
//! [`PartitionPlan`].
//!
//! Compilation runs three passes:
//! 1. segment construction — a deterministic walk with a pending-node
//!    buffer, flushed whenever a segmentation trigger fires (LLM node,
//!    HITL entry, merge point, branch point);
//! 2. node indexing — every node, including nodes inside nested branch
//!    plans, is mapped to its owning segment;
//! 3. linkage resolution — each segment's outgoing edges are mapped
//!    through the index into `Default`/`Conditional`/`End` linkage.
//!
//! All traversal state lives in a per-compile [`PartitionerContext`]; there
//! is no shared state across compile calls.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::{
    Result, SegflowError,
    graph::{CycleValidator, WorkflowGraph},
    model::{Condition, EdgeKind, EdgeModel, GraphModel, NodeId, NodeKind},
    plan::{
        plan::PartitionPlan,
        segment::{ConditionalTarget, Linkage, Segment, SegmentId, SegmentKind},
    },
};

/// Nesting ceiling for parallel groups; deeper graphs are rejected rather
/// than risking unbounded recursion on adversarial input.
const MAX_GROUP_DEPTH: usize = 32;

/// Compile-time counts reported alongside a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCounts {
    /// total segments, including nested branch plans
    pub segments: usize,
    /// workflow nodes covered by the plan
    pub covered_nodes: usize,
    /// workflow nodes in the source graph
    pub total_nodes: usize,
}

pub struct GraphPartitioner;

impl GraphPartitioner {
    /// Compile a graph model into a partition plan.
    ///
    /// Validation failures (`Graph`, `IllegalCycle`) and partition failures
    /// are fatal: no partial plan is ever returned.
    pub fn partition(model: &GraphModel) -> Result<(PartitionPlan, PlanCounts)> {
        let graph = WorkflowGraph::try_from(model)?;
        CycleValidator::validate(&graph)?;

        let mut ctx = PartitionerContext::new(&graph);
        let entries = graph.roots();
        let mut plan = PlanBuilder::new(&mut ctx, None).run(entries)?;

        Self::resolve_links(&graph, &mut plan, &[], &[])?;

        let covered = plan.flat_node_ids();
        let mut seen = HashSet::new();
        for id in covered.iter() {
            if !seen.insert(id.clone()) {
                return Err(SegflowError::Partition(format!("node {} is assigned to more than one segment", id)));
            }
        }
        let total = graph.node_count();
        if covered.len() < total {
            warn!("partition plan covers {} of {} nodes; unreachable tail dropped", covered.len(), total);
        }

        let counts = PlanCounts {
            segments: plan.segment_count(),
            covered_nodes: covered.len(),
            total_nodes: total,
        };
        debug!("partitioned graph {} into {} segments", model.id, counts.segments);
        Ok((plan, counts))
    }

    /// Pass 2 for one plan level: map every node to its owning segment.
    /// Nodes inside nested branch plans map to the parallel group that owns
    /// them at this level.
    fn index_plan(plan: &PartitionPlan) -> HashMap<NodeId, SegmentId> {
        let mut index = HashMap::new();
        for segment in plan.segments.iter() {
            for nid in segment.node_ids.iter() {
                index.insert(nid.clone(), segment.id);
            }
            for branch in segment.branches() {
                for nid in branch.flat_node_ids() {
                    index.insert(nid, segment.id);
                }
            }
        }
        index
    }

    /// Pass 3: resolve every segment's linkage by mapping its nodes'
    /// outgoing edges through the node index. Zero targets end the plan,
    /// one target links by default, several targets link conditionally.
    ///
    /// `ancestors` holds the node indexes of enclosing plans, nearest first;
    /// `enclosing_convergence` holds the convergence nodes of enclosing
    /// parallel groups — edges landing there from inside the group are
    /// skipped, they resolve naturally when the group completes.
    fn resolve_links(
        graph: &WorkflowGraph,
        plan: &mut PartitionPlan,
        ancestors: &[HashMap<NodeId, SegmentId>],
        enclosing_convergence: &[NodeId],
    ) -> Result<()> {
        let local = Self::index_plan(plan);

        for i in 0..plan.segments.len() {
            let segment = &plan.segments[i];
            let linkage = match &segment.kind {
                SegmentKind::ParallelGroup { .. } => {
                    // the aggregator directly follows its group by construction
                    match plan.segments.get(i + 1) {
                        Some(_) => Linkage::Default {
                            next: i + 1,
                        },
                        None => Linkage::End,
                    }
                }
                _ => Self::segment_linkage(graph, segment, &local, ancestors, enclosing_convergence)?,
            };
            plan.segments[i].next = linkage;
        }

        for i in 0..plan.segments.len() {
            let convergence = match plan.segments.get(i + 1).map(|s| &s.kind) {
                Some(SegmentKind::Aggregator { convergence_node }) => convergence_node.clone(),
                _ => None,
            };
            if let SegmentKind::ParallelGroup { branches } = &mut plan.segments[i].kind {
                let mut inner_ancestors = vec![local.clone()];
                inner_ancestors.extend(ancestors.iter().cloned());
                let mut inner_convergence = enclosing_convergence.to_vec();
                if let Some(conv) = convergence {
                    inner_convergence.push(conv);
                }
                for branch in branches.iter_mut() {
                    Self::resolve_links(graph, branch, &inner_ancestors, &inner_convergence)?;
                }
            }
        }
        Ok(())
    }

    fn segment_linkage(
        graph: &WorkflowGraph,
        segment: &Segment,
        local: &HashMap<NodeId, SegmentId>,
        ancestors: &[HashMap<NodeId, SegmentId>],
        enclosing_convergence: &[NodeId],
    ) -> Result<Linkage> {
        let mut targets: Vec<(Option<Condition>, SegmentId)> = Vec::new();

        for nid in segment.node_ids.iter() {
            let members = members_of(graph, nid);
            for edge in external_edges(graph, &members) {
                if enclosing_convergence.contains(&edge.target) {
                    continue;
                }
                let resolved = match local.get(&edge.target) {
                    Some(id) => {
                        if *id == segment.id {
                            continue; // edge internal to this segment
                        }
                        Some(*id)
                    }
                    None => ancestors.iter().find_map(|index| index.get(&edge.target)).copied(),
                };
                let Some(target) = resolved else {
                    return Err(SegflowError::Partition(format!("segment {} links to unmapped node {}", segment.id, edge.target)));
                };
                if targets.iter().any(|(_, t)| *t == target) {
                    continue;
                }
                targets.push((edge.condition.clone(), target));
            }
        }

        Ok(match targets.len() {
            0 => Linkage::End,
            1 => Linkage::Default {
                next: targets[0].1,
            },
            _ => {
                // guarded targets first, fallbacks last, declaration order preserved
                let (conditional, fallback): (Vec<_>, Vec<_>) = targets.into_iter().partition(|(c, _)| c.is_some());
                let branches = conditional
                    .into_iter()
                    .chain(fallback)
                    .map(|(condition, target)| ConditionalTarget {
                        condition,
                        target,
                    })
                    .collect();
                Linkage::Conditional {
                    branches,
                }
            }
        })
    }
}

/// Per-compile traversal state: the visited set plus group-nesting depth.
/// Owned by a single compile call, never shared.
struct PartitionerContext<'g> {
    graph: &'g WorkflowGraph,
    visited: HashSet<NodeId>,
    depth: usize,
}

impl<'g> PartitionerContext<'g> {
    fn new(graph: &'g WorkflowGraph) -> Self {
        Self {
            graph,
            visited: HashSet::new(),
            depth: 0,
        }
    }

    /// Claim a node and everything declared inside it (iterative-construct
    /// members travel with their container).
    fn claim(
        &mut self,
        id: &str,
    ) -> Vec<NodeId> {
        let members = members_of(self.graph, id);
        for member in members.iter() {
            self.visited.insert(member.clone());
        }
        members
    }

    /// Whether all upstream dependencies of a node have been claimed. A
    /// merge point is only segmented once every inbound chain has been
    /// walked, which keeps each plan in topological order.
    fn ready(
        &self,
        id: &str,
    ) -> bool {
        self.graph.incoming(id).iter().all(|edge| {
            if self.graph.share_iterative_container(&edge.source, &edge.target) {
                return true;
            }
            let source = resolve_node(self.graph, &edge.source);
            source == id || self.visited.contains(&source)
        })
    }

    /// Find the convergence node for a set of branch entries: the first
    /// node, in traversal order from the first branch, that is a merge
    /// point, is reachable from every branch, and is not itself one of the
    /// branch starts.
    fn find_convergence(
        &self,
        entries: &[NodeId],
    ) -> Option<NodeId> {
        let reachable: Vec<HashSet<NodeId>> = entries.iter().map(|entry| self.reachable_from(entry)).collect();
        let order = self.traversal_order(&entries[0]);

        for candidate in order {
            if entries.contains(&candidate) {
                continue;
            }
            if self.graph.merge_degree(&candidate) <= 1 {
                continue;
            }
            if reachable.iter().all(|set| set.contains(&candidate)) {
                return Some(candidate);
            }
        }
        None
    }

    fn reachable_from(
        &self,
        entry: &str,
    ) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(entry.to_string());
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for edge in external_edges(self.graph, &members_of(self.graph, &id)) {
                queue.push_back(edge.target);
            }
        }
        seen
    }

    fn traversal_order(
        &self,
        entry: &str,
    ) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(entry.to_string());
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            order.push(id.clone());
            for edge in external_edges(self.graph, &members_of(self.graph, &id)) {
                queue.push_back(edge.target);
            }
        }
        order
    }
}

/// Builder for one plan level. Parallel branches recurse into fresh
/// builders sharing the same [`PartitionerContext`].
struct PlanBuilder<'c, 'g> {
    ctx: &'c mut PartitionerContext<'g>,
    stop: Option<NodeId>,
    segments: Vec<Segment>,
    pending: Vec<NodeId>,
    /// walk stack of (node, starts-fresh-segment)
    stack: Vec<(NodeId, bool)>,
}

impl<'c, 'g> PlanBuilder<'c, 'g> {
    fn new(
        ctx: &'c mut PartitionerContext<'g>,
        stop: Option<NodeId>,
    ) -> Self {
        Self {
            ctx,
            stop,
            segments: Vec::new(),
            pending: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn run(
        mut self,
        entries: Vec<NodeId>,
    ) -> Result<PartitionPlan> {
        for entry in entries.into_iter().rev() {
            self.stack.push((entry, true));
        }

        while let Some((nid, fresh)) = self.stack.pop() {
            if self.stop.as_deref() == Some(nid.as_str()) || self.ctx.visited.contains(&nid) {
                self.flush();
                continue;
            }
            if !self.ctx.ready(&nid) {
                // a merge point whose other chains are still unwalked; the
                // last inbound chain re-pushes it
                self.flush();
                continue;
            }
            if fresh {
                self.flush();
            }
            self.step(nid)?;
        }
        self.flush();
        Ok(PartitionPlan {
            segments: self.segments,
        })
    }

    fn step(
        &mut self,
        nid: NodeId,
    ) -> Result<()> {
        let node = self.ctx.graph.node(&nid).ok_or(SegflowError::Partition(format!("node {} not found", nid)))?;
        let kind = node.kind;
        let hitl_entry = kind == NodeKind::Approval || self.ctx.graph.incoming(&nid).iter().any(|e| e.kind == EdgeKind::Hitl);
        let merge_point = self.ctx.graph.merge_degree(&nid) > 1;

        let members = self.ctx.claim(&nid);
        let outgoing = external_edges(self.ctx.graph, &members);
        let branch_point = outgoing.len() > 1;

        if hitl_entry {
            self.flush();
            self.emit(SegmentKind::Hitl, members);
        } else if kind == NodeKind::Llm {
            self.flush();
            self.emit(SegmentKind::Llm, members);
        } else if branch_point {
            // the branch node becomes its own single-node segment
            self.flush();
            self.emit(SegmentKind::Normal, members);
        } else if merge_point {
            self.flush();
            self.pending = members;
        } else {
            self.pending.extend(members);
        }

        self.route(outgoing)
    }

    fn route(
        &mut self,
        outgoing: Vec<EdgeModel>,
    ) -> Result<()> {
        match outgoing.len() {
            0 => {
                self.flush();
                Ok(())
            }
            1 => {
                self.stack.push((outgoing[0].target.clone(), false));
                Ok(())
            }
            _ => {
                self.flush();
                if outgoing.iter().any(|e| e.condition.is_some()) {
                    // decision point: exclusive routing, no fan-out group
                    for edge in outgoing.iter().rev() {
                        self.stack.push((edge.target.clone(), true));
                    }
                    Ok(())
                } else {
                    self.parallel_group(&outgoing)
                }
            }
        }
    }

    /// Wrap unconditional fan-out branches into a ParallelGroup followed by
    /// an Aggregator owning the convergence node.
    fn parallel_group(
        &mut self,
        outgoing: &[EdgeModel],
    ) -> Result<()> {
        if self.ctx.depth >= MAX_GROUP_DEPTH {
            return Err(SegflowError::Partition(format!("parallel groups nested deeper than {}", MAX_GROUP_DEPTH)));
        }

        let entries: Vec<NodeId> = outgoing.iter().map(|e| e.target.clone()).collect();
        let convergence = self.ctx.find_convergence(&entries).filter(|conv| !self.ctx.visited.contains(conv));

        self.ctx.depth += 1;
        let mut branches = Vec::new();
        for entry in entries.iter() {
            let builder = PlanBuilder::new(&mut *self.ctx, convergence.clone());
            branches.push(builder.run(vec![entry.clone()])?);
        }
        self.ctx.depth -= 1;

        self.emit(
            SegmentKind::ParallelGroup {
                branches,
            },
            Vec::new(),
        );

        match convergence {
            Some(conv) => {
                let members = self.ctx.claim(&conv);
                let conv_outgoing = external_edges(self.ctx.graph, &members);
                self.emit(
                    SegmentKind::Aggregator {
                        convergence_node: Some(conv),
                    },
                    members,
                );
                self.route(conv_outgoing)
            }
            None => {
                warn!("parallel branches never reconverge; treating group as plan terminus");
                self.emit(
                    SegmentKind::Aggregator {
                        convergence_node: None,
                    },
                    Vec::new(),
                );
                Ok(())
            }
        }
    }

    fn emit(
        &mut self,
        kind: SegmentKind,
        node_ids: Vec<NodeId>,
    ) {
        let id = self.segments.len();
        self.segments.push(Segment::new(id, kind, node_ids));
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let nodes = std::mem::take(&mut self.pending);
        self.emit(SegmentKind::Normal, nodes);
    }
}

/// A node plus everything declared inside it, in declaration order.
fn members_of(
    graph: &WorkflowGraph,
    id: &str,
) -> Vec<NodeId> {
    let mut members = vec![id.to_string()];
    for candidate in graph.node_ids() {
        if candidate != id && graph.containers(&candidate).contains(&id.to_string()) {
            members.push(candidate);
        }
    }
    members
}

/// A node id resolved to its outermost iterative container, if any.
fn resolve_node(
    graph: &WorkflowGraph,
    id: &str,
) -> NodeId {
    graph.containers(id).last().cloned().unwrap_or_else(|| id.to_string())
}

/// The outgoing edges of a member group that leave the group, with targets
/// normalized to their outermost container, deduplicated by target, in
/// deterministic order.
fn external_edges(
    graph: &WorkflowGraph,
    members: &[NodeId],
) -> Vec<EdgeModel> {
    let mut edges: Vec<EdgeModel> = Vec::new();
    for member in members.iter() {
        for edge in graph.outgoing(member) {
            let target = resolve_node(graph, &edge.target);
            if members.contains(&target) {
                continue;
            }
            if edges.iter().any(|e| e.target == target) {
                continue;
            }
            let mut edge = edge.clone();
            edge.target = target;
            edges.push(edge);
        }
    }
    edges
}

#[cfg(test)]
mod test {
    use super::{GraphPartitioner, PlanCounts};
    use crate::{
        model::{ComparisonOperator, Condition, ConditionValue, EdgeKind, EdgeModel, GraphModel, NodeKind, NodeModel},
        plan::segment::{Linkage, SegmentKind},
    };

    fn node(
        id: &str,
        kind: NodeKind,
    ) -> NodeModel {
        NodeModel {
            id: id.to_string(),
            title: id.to_string(),
            kind,
            ..Default::default()
        }
    }

    fn edge(
        source: &str,
        target: &str,
    ) -> EdgeModel {
        EdgeModel {
            id: format!("{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    fn model(
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> GraphModel {
        GraphModel {
            id: "wf".to_string(),
            name: "wf".to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    #[test]
    fn test_llm_nodes_are_isolated() {
        let m = model(
            vec![node("a", NodeKind::Operator), node("b", NodeKind::Llm), node("c", NodeKind::Operator)],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let (plan, counts) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.segments[0].kind, SegmentKind::Normal);
        assert_eq!(plan.segments[1].kind, SegmentKind::Llm);
        assert_eq!(plan.segments[2].kind, SegmentKind::Normal);
        assert_eq!(plan.segments[0].next, Linkage::Default { next: 1 });
        assert_eq!(plan.segments[1].next, Linkage::Default { next: 2 });
        assert_eq!(plan.segments[2].next, Linkage::End);
        assert_eq!(
            counts,
            PlanCounts {
                segments: 3,
                covered_nodes: 3,
                total_nodes: 3
            }
        );
    }

    #[test]
    fn test_consecutive_operators_share_a_segment() {
        let m = model(
            vec![node("a", NodeKind::Operator), node("b", NodeKind::Operator), node("c", NodeKind::Operator)],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.segments[0].node_ids, vec!["a", "b", "c"]);
        assert_eq!(plan.segments[0].next, Linkage::End);
    }

    #[test]
    fn test_hitl_edge_starts_hitl_segment() {
        let mut edges = vec![edge("a", "h"), edge("h", "b")];
        edges[0].kind = EdgeKind::Hitl;
        let m = model(vec![node("a", NodeKind::Operator), node("h", NodeKind::Approval), node("b", NodeKind::Operator)], edges);
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.segments[1].kind, SegmentKind::Hitl);
        assert_eq!(plan.segments[1].node_ids, vec!["h"]);
    }

    #[test]
    fn test_diamond_becomes_parallel_group() {
        let m = model(
            vec![
                node("s", NodeKind::Operator),
                node("b", NodeKind::Operator),
                node("c", NodeKind::Operator),
                node("m", NodeKind::Operator),
                node("t", NodeKind::Operator),
            ],
            vec![edge("s", "b"), edge("s", "c"), edge("b", "m"), edge("c", "m"), edge("m", "t")],
        );
        let (plan, counts) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(plan.segments[0].node_ids, vec!["s"]);
        match &plan.segments[1].kind {
            SegmentKind::ParallelGroup { branches } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].segments[0].node_ids, vec!["b"]);
                assert_eq!(branches[1].segments[0].node_ids, vec!["c"]);
                // branch tails end inside their own plan; the edge onto the
                // aggregator resolves when the group completes
                assert_eq!(branches[0].segments[0].next, Linkage::End);
            }
            other => panic!("expected parallel group, got {:?}", other),
        }
        match &plan.segments[2].kind {
            SegmentKind::Aggregator { convergence_node } => {
                assert_eq!(convergence_node.as_deref(), Some("m"));
            }
            other => panic!("expected aggregator, got {:?}", other),
        }
        assert_eq!(plan.segments[2].node_ids, vec!["m"]);
        assert_eq!(plan.segments[2].next, Linkage::Default { next: 3 });
        assert_eq!(plan.segments[3].node_ids, vec!["t"]);

        // every node exactly once, including branch nodes
        let mut covered = plan.flat_node_ids();
        covered.sort();
        assert_eq!(covered, vec!["b", "c", "m", "s", "t"]);
        assert_eq!(counts.covered_nodes, 5);
    }

    #[test]
    fn test_branch_segment_links_to_group_once() {
        let m = model(
            vec![
                node("s", NodeKind::Operator),
                node("b", NodeKind::Operator),
                node("c", NodeKind::Operator),
                node("m", NodeKind::Operator),
            ],
            vec![edge("s", "b"), edge("s", "c"), edge("b", "m"), edge("c", "m")],
        );
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();
        // both outgoing edges of s map to the group segment, deduplicated
        assert_eq!(plan.segments[0].next, Linkage::Default { next: 1 });
    }

    #[test]
    fn test_conditional_edges_route_exclusively() {
        let cond = |value: &str| Condition {
            variable: "decision".to_string(),
            operator: ComparisonOperator::Is,
            value: Some(ConditionValue::Str(value.to_string())),
        };
        let mut e1 = edge("a", "b");
        e1.kind = EdgeKind::Conditional;
        e1.condition = Some(cond("left"));
        let mut e2 = edge("a", "c");
        e2.kind = EdgeKind::Conditional;
        e2.condition = Some(cond("right"));

        let m = model(vec![node("a", NodeKind::Operator), node("b", NodeKind::Operator), node("c", NodeKind::Operator)], vec![e1, e2]);
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 3);
        match &plan.segments[0].next {
            Linkage::Conditional { branches } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].target, 1);
                assert_eq!(branches[1].target, 2);
                assert!(branches.iter().all(|b| b.condition.is_some()));
            }
            other => panic!("expected conditional linkage, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_point_starts_new_segment() {
        let m = model(
            vec![node("r1", NodeKind::Operator), node("r2", NodeKind::Operator), node("m", NodeKind::Operator)],
            vec![edge("r1", "m"), edge("r2", "m")],
        );
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.segments[0].node_ids, vec!["r1"]);
        assert_eq!(plan.segments[1].node_ids, vec!["r2"]);
        assert_eq!(plan.segments[2].node_ids, vec!["m"]);
        assert_eq!(plan.segments[0].next, Linkage::Default { next: 2 });
        assert_eq!(plan.segments[1].next, Linkage::Default { next: 2 });
    }

    #[test]
    fn test_iterative_construct_travels_with_its_members() {
        let mut wrapper = node("each", NodeKind::ForEach);
        wrapper.title = "fan".to_string();
        let mut x = node("x", NodeKind::Operator);
        x.parent = Some("each".to_string());
        let mut y = node("y", NodeKind::Operator);
        y.parent = Some("each".to_string());

        let m = model(
            vec![node("a", NodeKind::Operator), wrapper, x, y, node("z", NodeKind::Operator)],
            vec![edge("a", "each"), edge("x", "y"), edge("y", "x"), edge("each", "z")],
        );
        let (plan, counts) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.segments[0].node_ids, vec!["a", "each", "x", "y", "z"]);
        assert_eq!(counts.covered_nodes, 5);
    }

    #[test]
    fn test_no_convergence_degrades_to_terminus() {
        let m = model(
            vec![node("s", NodeKind::Operator), node("b", NodeKind::Operator), node("c", NodeKind::Operator)],
            vec![edge("s", "b"), edge("s", "c")],
        );
        let (plan, _) = GraphPartitioner::partition(&m).unwrap();

        assert_eq!(plan.len(), 3);
        assert!(plan.segments[1].is_parallel_group());
        match &plan.segments[2].kind {
            SegmentKind::Aggregator { convergence_node } => assert!(convergence_node.is_none()),
            other => panic!("expected aggregator, got {:?}", other),
        }
        assert_eq!(plan.segments[2].next, Linkage::End);
    }

    #[test]
    fn test_partition_is_deterministic_under_edge_order() {
        let nodes = || {
            vec![
                node("s", NodeKind::Operator),
                node("b", NodeKind::Llm),
                node("c", NodeKind::Operator),
                node("m", NodeKind::Operator),
                node("t", NodeKind::Operator),
            ]
        };
        let edges = vec![edge("s", "b"), edge("s", "c"), edge("b", "m"), edge("c", "m"), edge("m", "t")];
        let mut shuffled = edges.clone();
        shuffled.reverse();

        let (plan_a, _) = GraphPartitioner::partition(&model(nodes(), edges)).unwrap();
        let (plan_b, _) = GraphPartitioner::partition(&model(nodes(), shuffled)).unwrap();

        assert_eq!(plan_a, plan_b);
    }

    #[test]
    fn test_nested_parallel_groups() {
        // s fans out to (b, c); branch b fans out again to (d, e) converging
        // at f; both outer branches converge at m
        let m = model(
            vec![
                node("s", NodeKind::Operator),
                node("b", NodeKind::Operator),
                node("c", NodeKind::Operator),
                node("d", NodeKind::Operator),
                node("e", NodeKind::Operator),
                node("f", NodeKind::Operator),
                node("m", NodeKind::Operator),
            ],
            vec![
                edge("s", "b"),
                edge("s", "c"),
                edge("b", "d"),
                edge("b", "e"),
                edge("d", "f"),
                edge("e", "f"),
                edge("f", "m"),
                edge("c", "m"),
            ],
        );
        let (plan, counts) = GraphPartitioner::partition(&m).unwrap();

        let group = &plan.segments[1];
        let branches = group.branches();
        assert_eq!(branches.len(), 2);
        // first branch contains its own nested group for (d, e)
        assert!(branches[0].segments.iter().any(|s| s.is_parallel_group()));
        assert_eq!(counts.covered_nodes, 7);
        assert_eq!(counts.total_nodes, 7);
    }
}
