//! Compiled partition plans.
//!
//! The partitioner turns a validated workflow graph into a [`PartitionPlan`]:
//! an ordered, linked sequence of [`Segment`]s, with nested sub-plans for
//! parallel branches. Plans are pure data — serializable, deterministic for
//! a given graph, and safe to cache by content hash.

mod condition;
mod partitioner;
mod plan;
mod segment;

pub use condition::evaluate;
pub use partitioner::{GraphPartitioner, PlanCounts};
pub use plan::{PartitionPlan, content_hash};
pub use segment::{Linkage, ConditionalTarget, Segment, SegmentId, SegmentKind};
