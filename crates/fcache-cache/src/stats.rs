//! Hit/miss/error accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use fcache_core::types::stats::{CacheStats, StoreStats};

/// Request counters owned by one cache instance.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Combine the current counts with a store's stats.
    pub fn snapshot(&self, store: StoreStats) -> CacheStats {
        CacheStats {
            hits: self.hits(),
            misses: self.misses(),
            errors: self.errors(),
            store,
        }
    }
}
