//! Store and cache statistics.

use serde::{Deserialize, Serialize};

/// Statistics reported by a backend store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored objects.
    pub keys: u64,
    /// Total size of stored objects in bytes.
    pub size: u64,
}

/// Statistics of a loading cache, including its store's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    #[serde(flatten)]
    pub store: StoreStats,
}
