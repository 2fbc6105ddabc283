//! `stat` command.

use serde::Serialize;
use tabled::Tabled;

use fcache_cache::LoadingCache;
use fcache_core::result::CacheResult;
use fcache_core::types::stats::CacheStats;

use crate::output::{self, OutputFormat};

/// Stats display row
#[derive(Debug, Serialize, Tabled)]
struct StatRow {
    store: String,
    keys: u64,
    size: String,
    hits: u64,
    misses: u64,
    errors: u64,
}

impl StatRow {
    fn new(store: &str, stats: CacheStats) -> Self {
        Self {
            store: store.to_string(),
            keys: stats.store.keys,
            size: output::format_bytes(stats.store.size),
            hits: stats.hits,
            misses: stats.misses,
            errors: stats.errors,
        }
    }
}

/// Execute the stat command
pub async fn execute(cache: &LoadingCache, format: OutputFormat) -> CacheResult<()> {
    let stats = cache.stat().await?;
    match format {
        OutputFormat::Json => output::print_json(&stats),
        OutputFormat::Table => {
            output::print_item(&StatRow::new(cache.store().store_type(), stats), format)
        }
    }
    Ok(())
}
