use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    model::{GraphModel, NodeId},
    plan::segment::{Segment, SegmentId, SegmentKind},
};

/// Compiled, executable form of a workflow graph: an ordered, linked list of
/// segments. Parallel-group segments own one nested plan per branch.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PartitionPlan {
    pub segments: Vec<Segment>,
}

impl PartitionPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// get segment by id
    pub fn get(
        &self,
        id: SegmentId,
    ) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// All workflow node ids covered by this plan, including nodes inside
    /// nested branch plans, in plan order.
    pub fn flat_node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for segment in self.segments.iter() {
            ids.extend(segment.node_ids.iter().cloned());
            if let SegmentKind::ParallelGroup { branches } = &segment.kind {
                for branch in branches {
                    ids.extend(branch.flat_node_ids());
                }
            }
        }
        ids
    }

    /// Total segment count, including segments inside nested branch plans.
    pub fn segment_count(&self) -> usize {
        let mut count = self.segments.len();
        for segment in self.segments.iter() {
            for branch in segment.branches() {
                count += branch.segment_count();
            }
        }
        count
    }
}

/// Content hash of a graph model, used as the plan-cache key.
///
/// Edges are sorted by id before hashing so that two models differing only
/// in edge declaration order — which compile to structurally identical
/// plans — share a hash.
pub fn content_hash(model: &GraphModel) -> String {
    let mut canonical = model.clone();
    canonical.edges.sort_by(|a, b| a.id.cmp(&b.id));

    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod test {
    use super::content_hash;
    use crate::model::{EdgeModel, GraphModel, NodeModel};

    #[test]
    fn test_content_hash_ignores_edge_order() {
        let nodes = vec![
            NodeModel {
                id: "a".to_string(),
                title: "a".to_string(),
                ..Default::default()
            },
            NodeModel {
                id: "b".to_string(),
                title: "b".to_string(),
                ..Default::default()
            },
        ];
        let e1 = EdgeModel {
            id: "e1".to_string(),
            source: "a".to_string(),
            target: "b".to_string(),
            ..Default::default()
        };
        let e2 = EdgeModel {
            id: "e2".to_string(),
            source: "b".to_string(),
            target: "a".to_string(),
            ..Default::default()
        };

        let forward = GraphModel {
            id: "g".to_string(),
            name: "g".to_string(),
            nodes: nodes.clone(),
            edges: vec![e1.clone(), e2.clone()],
            ..Default::default()
        };
        let reversed = GraphModel {
            edges: vec![e2, e1],
            ..forward.clone()
        };

        assert_eq!(content_hash(&forward), content_hash(&reversed));
    }
}
