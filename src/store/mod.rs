//! Storage contracts required by the core.
//!
//! Durable backends are external collaborators; this module defines the
//! contracts the engine needs from them — a token store with conditional
//! delete and an object store for payload offload — plus in-memory
//! implementations used by tests and embedded deployments.

mod mem;

use serde_json::Value;

use crate::Result;

pub use mem::{MemObjectStore, MemTokenStore};

/// Store for resumption token records.
///
/// Atomicity of the conditional delete is delegated to the backend; the
/// engine never implements compare-and-delete in process.
pub trait TokenStore: Send + Sync {
    /// Persist a record under `id` with a time-to-live.
    fn put(
        &self,
        id: &str,
        record: Value,
        ttl_secs: u64,
    ) -> Result<()>;

    /// Fetch a record; `None` when absent or expired.
    fn get(
        &self,
        id: &str,
    ) -> Result<Option<Value>>;

    /// Delete the record only if its stored credential matches. Returns
    /// whether a delete happened; a mismatch is not an error.
    fn delete_if_matches(
        &self,
        id: &str,
        expected_credential: &str,
    ) -> Result<bool>;
}

/// Store for offloaded payloads (state, result logs, plan slices).
pub trait ObjectStore: Send + Sync {
    /// Write bytes at a path, returning an opaque pointer.
    fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<String>;

    /// Read the bytes behind a pointer.
    fn get(
        &self,
        pointer: &str,
    ) -> Result<Vec<u8>>;
}

/// Canonical object path: `{kind}/{owner}/{workflow}/{execution}/{chunk}/{artifact}`.
///
/// Every artifact the engine offloads is scoped by the full identity tuple,
/// so concurrent chunks never contend on a key.
pub fn object_path(
    kind: &str,
    owner: &str,
    workflow: &str,
    execution: &str,
    chunk: &str,
    artifact: &str,
) -> String {
    format!("{}/{}/{}/{}/{}/{}", kind, owner, workflow, execution, chunk, artifact)
}
