//! # Segflow
//!
//! Segflow is a graph-partitioning workflow compiler and a distributed,
//! resumable segment-execution engine, designed for serverless runtimes
//! where workers are short-lived and stateless.
//!
//! ## Core pieces
//!
//! - **Cycle validation**: submitted graphs must be acyclic outside of
//!   declared iterative constructs; violations fail with the full cycle path
//! - **Partitioning**: a validated graph compiles into an ordered, linked
//!   sequence of segments, with nested sub-plans for parallel branches
//! - **Chunk processing**: workers execute contiguous plan slices one
//!   segment at a time, pausing indefinitely for human input
//! - **Resumption**: single-use callback tokens reconstruct execution
//!   context exactly once when an external actor responds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segflow::{EngineBuilder, GraphModel};
//!
//! let engine = EngineBuilder::new().runner(runner).build()?;
//!
//! let graph = GraphModel::from_json(json_str)?;
//! let outcome = engine.run(&graph, "owner", serde_json::json!({})).await?;
//! if let Some(id) = outcome.resumption_id {
//!     engine.resume(&graph, &id, serde_json::json!("Approved")).await?;
//! }
//! ```

mod builder;
mod common;
mod config;
mod engine;
mod error;
mod graph;
mod model;
mod plan;
mod resume;
mod runtime;
mod store;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::Config;
pub use engine::{Engine, RunOutcome};
pub use error::SegflowError;
pub use graph::{CycleValidator, WorkflowGraph};
pub use model::*;
pub use plan::{ConditionalTarget, GraphPartitioner, Linkage, PartitionPlan, PlanCounts, Segment, SegmentId, SegmentKind, content_hash};
pub use resume::{ChunkContinuation, RegisterRequest, ResumptionRegistrar, ResumptionToken, TokenStatus};
pub use runtime::{
    Chunk, ChunkId, ChunkProcessor, ChunkResult, ChunkStatus, ExecutionState, PlanSlice, RunnerOutput, RunnerStatus, SegmentEvent, SegmentRecord,
    SegmentRunner, StepOutcome,
};
pub use store::{MemObjectStore, MemTokenStore, ObjectStore, TokenStore, object_path};

/// Result type alias for Segflow operations.
pub type Result<T> = std::result::Result<T, SegflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
