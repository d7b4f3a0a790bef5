//! In-memory cache for compile artifacts.
//!
//! Uses moka's concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory cache with bounded capacity.
///
/// Used for:
/// - compiled plans, keyed by graph content hash (`MemCache<String, Arc<PartitionPlan>>`)
/// - chunk bookkeeping in the embedding engine (`MemCache<ChunkId, ChunkRef>`)
///
/// Entries are evicted least-recently-used once capacity is exceeded; a
/// cache miss simply recompiles or re-reads.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    /// Store a value under a key.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Look up a value by key.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Drop a key.
    pub fn remove(
        &self,
        key: &K,
    ) {
        self.entries.remove(key);
    }
}
