//! Error types for Segflow.
//!
//! All errors in Segflow are represented by the `SegflowError` enum,
//! which provides specific variants for different error categories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Segflow operations.
///
/// Compile-time errors (`Graph`, `IllegalCycle`, `Partition`) are fatal: no
/// partial plan is ever produced. `ChunkExecution` is caught per segment and
/// recorded in the chunk result log. `Store` errors during state offload or
/// token persistence are always surfaced — paused state is never silently
/// dropped.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum SegflowError {
    /// Malformed graph input (missing nodes, dangling edges, schema violations).
    #[error("{0}")]
    Graph(String),

    /// A cycle outside of any declared iterative construct.
    ///
    /// Carries the full cycle path, ordered, with the entry node repeated at
    /// the end (`[a, b, c, a]`).
    #[error("illegal cycle detected: {}", path.join(" -> "))]
    IllegalCycle {
        path: Vec<String>,
    },

    /// Partition plan construction errors (broken linkage, bad segment refs).
    #[error("{0}")]
    Partition(String),

    /// A segment runner failure inside a chunk.
    #[error("segment {segment} failed: {message}")]
    ChunkExecution {
        segment: usize,
        message: String,
    },

    /// Resumption token errors (missing identity components, invalid key,
    /// consumption of an unknown or already-used token).
    #[error("{0}")]
    Token(String),

    /// Token store or object store failures.
    #[error("{0}")]
    Store(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Defensive-bug signals: states the engine considers impossible after
    /// validation (e.g. topological ordering failing on a validated graph).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SegflowError> for String {
    fn from(val: SegflowError) -> Self {
        val.to_string()
    }
}

impl From<serde_json::Error> for SegflowError {
    fn from(error: serde_json::Error) -> Self {
        SegflowError::Convert(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for SegflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        SegflowError::Graph(error.to_string())
    }
}
