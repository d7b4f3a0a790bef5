use serde::{Deserialize, Serialize};

use crate::{
    model::{Condition, NodeId},
    plan::plan::PartitionPlan,
};

/// Segment id, 0-based and unique within its owning plan.
pub type SegmentId = usize;

/// Kind of a plan segment.
///
/// A closed set: unknown segment kinds cannot exist in a compiled plan, and
/// the recursive parallel structure is carried directly by the
/// `ParallelGroup` variant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SegmentKind {
    /// One or more plain operator nodes executed back to back.
    Normal,
    /// A single LLM-invoking node, isolated for cost/timeout/retry granularity.
    Llm,
    /// A human-in-the-loop gate; the runner is expected to pause here.
    Hitl,
    /// A parallel fan-out owning one nested plan per branch.
    ParallelGroup {
        branches: Vec<PartitionPlan>,
    },
    /// The reunion point after a parallel group.
    ///
    /// `convergence_node` is `None` when the branches never reconverge; the
    /// plan then terminates here (see the partitioner's degradation rules).
    Aggregator {
        convergence_node: Option<NodeId>,
    },
}

/// Where control flows after a segment completes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Linkage {
    /// Single unconditional successor.
    Default {
        next: SegmentId,
    },
    /// Exclusive routing: the first matching condition wins; a `None`
    /// condition is the fallback branch.
    Conditional {
        branches: Vec<ConditionalTarget>,
    },
    /// Plan terminus.
    End,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConditionalTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub target: SegmentId,
}

/// One unit of plan execution, covering one or a few workflow nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Segment {
    /// segment id, 0-based within the owning plan
    pub id: SegmentId,
    /// segment kind
    pub kind: SegmentKind,
    /// workflow nodes this segment executes, in order
    pub node_ids: Vec<NodeId>,
    /// successor linkage, resolved in the final compile pass
    pub next: Linkage,
}

impl Segment {
    pub fn new(
        id: SegmentId,
        kind: SegmentKind,
        node_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            id,
            kind,
            node_ids,
            next: Linkage::End,
        }
    }

    /// Whether this segment is a parallel group.
    pub fn is_parallel_group(&self) -> bool {
        matches!(self.kind, SegmentKind::ParallelGroup { .. })
    }

    /// Nested branch plans for a parallel group, empty otherwise.
    pub fn branches(&self) -> &[PartitionPlan] {
        match &self.kind {
            SegmentKind::ParallelGroup { branches } => branches,
            _ => &[],
        }
    }
}
