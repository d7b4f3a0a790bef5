use serde::{Deserialize, Serialize};

use crate::runtime::ExecutionState;

/// Lifecycle status stored on a token record.
///
/// Consumption is normally expressed by deleting the record; `Consumed`
/// exists for backends that mark instead of delete.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenStatus {
    #[default]
    Waiting,
    Consumed,
}

/// Single-use resume credential persisted while a chunk is paused.
///
/// The paused state is stored inline when small; above the inline limit it
/// moves to the object store and only `state_pointer` plus a short summary
/// remain on the token — the full state is never stored twice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResumptionToken {
    /// composed id: owner, workflow, execution, chunk, paused index
    pub resumption_id: String,
    /// opaque callback credential issued by the execution substrate
    pub task_token: String,
    /// id of the paused chunk
    pub chunk_id: String,
    /// plan id of the paused segment
    pub paused_index: usize,
    /// execution the chunk belongs to
    pub parent_execution: String,
    /// owner of the workflow
    pub owner: String,
    /// workflow id
    pub workflow: String,
    /// token lifecycle status
    pub status: TokenStatus,
    /// creation time, epoch milliseconds
    pub created_at: i64,
    /// time-to-live in seconds
    pub ttl_secs: u64,
    /// paused state, inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ExecutionState>,
    /// object store pointer to the paused state, when offloaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_pointer: Option<String>,
    /// human-readable summary of the offloaded state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_summary: Option<String>,
}

/// Continuation handed to the driving layer after a successful resume.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContinuation {
    /// plan id to continue from (the segment after the paused one)
    pub resume_from_index: usize,
    /// paused state with the external response merged in
    pub merged_state: ExecutionState,
    /// id of the paused chunk
    pub chunk_id: String,
    /// execution the chunk belongs to
    pub parent_execution: String,
    /// owner of the workflow
    pub owner: String,
    /// workflow id
    pub workflow: String,
}
