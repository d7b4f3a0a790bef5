//! Chunk execution runtime.
//!
//! A [`Chunk`] is a worker-assigned contiguous slice of a partition plan.
//! The [`ChunkProcessor`] executes it one segment at a time against an
//! injected [`SegmentRunner`], pausing for human input, offloading oversized
//! payloads, and classifying the outcome.

mod chunk;
mod processor;
mod runner;
mod state;

pub use chunk::{Chunk, ChunkId, ChunkResult, ChunkStatus, PlanSlice, SegmentRecord};
pub use processor::{ChunkProcessor, StepOutcome};
pub use runner::{RunnerOutput, RunnerStatus, SegmentEvent, SegmentRunner};
pub use state::{ExecutionState, FEEDBACK_KEY, INCOMING_VALUE_KEY, MESSAGES_KEY, PREVIOUS_VALUE_KEY};
