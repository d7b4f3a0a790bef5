//! Suspend/resume protocol.
//!
//! When a chunk pauses for external input, the [`ResumptionRegistrar`]
//! persists a single-use [`ResumptionToken`]; when the external actor
//! responds, the registrar reconstructs the paused state, merges the
//! response, and hands back a [`ChunkContinuation`] for the driving layer.

mod registrar;
mod token;

pub use registrar::{RegisterRequest, ResumptionRegistrar};
pub use token::{ChunkContinuation, ResumptionToken, TokenStatus};
