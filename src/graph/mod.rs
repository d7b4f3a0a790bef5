//! Runtime graph representation and structural validation.
//!
//! [`WorkflowGraph`] wraps the authored model in a directed graph structure
//! (using petgraph) with deterministic adjacency ordering. [`CycleValidator`]
//! rejects cycles outside declared iterative constructs before partitioning
//! is allowed to run.

mod graph;
mod validate;

pub use graph::WorkflowGraph;
pub use validate::CycleValidator;
