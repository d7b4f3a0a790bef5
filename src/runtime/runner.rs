//! The segment runner contract.
//!
//! Concrete node execution — prompt construction, HTTP calls, DB queries —
//! lives outside this crate. The engine hands the runner one segment at a
//! time and interprets the reported status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    plan::Segment,
    runtime::state::ExecutionState,
};

/// Status reported by a segment runner.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunnerStatus {
    /// Segment finished; `final_state` is the segment's output.
    #[default]
    Complete,
    /// Segment is waiting on external input; `task_token` carries the
    /// single-use callback credential.
    Pause,
    /// Segment is a parallel group; the fan-out layer drives it.
    ParallelGroup,
    /// Segment failed.
    Failed,
}

/// Execution event handed to the runner for one segment.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SegmentEvent {
    /// owner of the workflow
    pub owner: String,
    /// workflow id
    pub workflow: String,
    /// execution id
    pub execution: String,
    /// id of the chunk this segment belongs to
    pub chunk_id: String,
    /// segment position within the plan being processed
    pub segment_index: usize,
    /// the segment itself: kind, node ids, linkage
    pub segment: Segment,
    /// state accumulated so far
    pub state: ExecutionState,
}

/// Output of one segment execution.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub status: RunnerStatus,
    pub final_state: ExecutionState,
    pub task_token: Option<String>,
    pub error: Option<String>,
}

impl RunnerOutput {
    /// Segment completed with the given output state.
    pub fn complete(final_state: ExecutionState) -> Self {
        Self {
            status: RunnerStatus::Complete,
            final_state,
            task_token: None,
            error: None,
        }
    }

    /// Segment paused; `task_token` is the callback credential an external
    /// actor must present to resume.
    pub fn pause(task_token: impl Into<String>) -> Self {
        Self {
            status: RunnerStatus::Pause,
            final_state: ExecutionState::new(),
            task_token: Some(task_token.into()),
            error: None,
        }
    }

    /// Segment is a parallel group the runner does not drive.
    pub fn parallel_group() -> Self {
        Self {
            status: RunnerStatus::ParallelGroup,
            final_state: ExecutionState::new(),
            task_token: None,
            error: None,
        }
    }

    /// Segment failed with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunnerStatus::Failed,
            final_state: ExecutionState::new(),
            task_token: None,
            error: Some(error.into()),
        }
    }
}

/// Executes the nodes of one segment.
///
/// Contract notes:
/// - The runner owns executor configuration lookup for the event's node ids.
/// - A retried chunk re-executes every segment in its slice; the processor
///   performs no deduplication, so `run` must be idempotent for segments
///   whose effects must not repeat.
#[async_trait]
pub trait SegmentRunner: Send + Sync {
    async fn run(
        &self,
        event: SegmentEvent,
    ) -> Result<RunnerOutput>;
}
