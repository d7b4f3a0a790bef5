use serde::{Deserialize, Serialize};

use crate::{
    plan::Segment,
    runtime::{runner::RunnerStatus, state::ExecutionState},
};

/// chunk id
pub type ChunkId = String;

/// The plan slice carried by a chunk: inline for small plans, an object
/// store pointer for plans too large to ship with every invocation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PlanSlice {
    Inline(Vec<Segment>),
    Pointer(String),
}

/// A worker-assigned contiguous slice of a partition plan.
///
/// Exactly one worker processes a chunk at a time; horizontal parallelism
/// comes only from the fan-out layer assigning disjoint chunks.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Chunk {
    /// chunk id
    pub chunk_id: ChunkId,
    /// position of this chunk within the plan's chunking
    pub chunk_index: usize,
    /// total number of chunks the plan was split into
    pub total_chunks: usize,
    /// plan id of the first segment in the slice
    pub start_segment: usize,
    /// the segments to execute, inline or by pointer
    pub slice: PlanSlice,
    /// state entering the chunk
    pub current_state: ExecutionState,
    /// owner of the workflow
    pub owner: String,
    /// workflow id
    pub workflow: String,
    /// execution id
    pub execution: String,
}

/// Terminal classification of a processed chunk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChunkStatus {
    /// Every attempted segment succeeded.
    #[default]
    Completed,
    /// No segment succeeded.
    Failed,
    /// Some segments succeeded before a failure was recorded.
    PartialFailure,
    /// A segment paused for external input; the chunk is not complete.
    Paused,
}

/// Per-segment entry in the chunk result log.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SegmentRecord {
    /// plan id of the segment
    pub segment_index: usize,
    /// runner status as recorded
    pub status: RunnerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// execution start, epoch milliseconds
    pub started_at: i64,
    /// execution end, epoch milliseconds
    pub ended_at: i64,
}

/// Result of processing one chunk.
///
/// The serialized payload is always bounded: state and the result log move
/// to the object store behind `final_state_pointer` once they exceed the
/// configured inline limit.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChunkResult {
    /// chunk id
    pub chunk_id: ChunkId,
    /// terminal classification
    pub status: ChunkStatus,
    /// number of segments that completed successfully
    pub processed_segments: usize,
    /// plan id of the last successfully completed segment
    pub last_completed_segment: Option<usize>,
    /// plan id of the paused segment, when status is `Paused`
    pub paused_segment_id: Option<usize>,
    /// resumption token id registered on pause
    pub resumption_id: Option<String>,
    /// plan id the driving layer should run next, when unambiguous
    pub next_segment_to_run: Option<usize>,
    /// accumulated state, empty when offloaded
    pub final_state: ExecutionState,
    /// object store pointer to the offloaded state and log
    pub final_state_pointer: Option<String>,
    /// per-segment result log, empty when offloaded
    pub records: Vec<SegmentRecord>,
}
