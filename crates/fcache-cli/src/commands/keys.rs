//! `keys` command.

use serde::Serialize;
use tabled::Tabled;

use fcache_cache::LoadingCache;
use fcache_core::result::CacheResult;

use crate::output::{self, OutputFormat};

/// Stored object display row
#[derive(Debug, Serialize, Tabled)]
struct KeyRow {
    key: String,
    name: String,
    mime: String,
    size: String,
    invalidate_at: String,
}

/// Execute the keys command
pub async fn execute(cache: &LoadingCache, format: OutputFormat) -> CacheResult<()> {
    if format == OutputFormat::Json {
        output::print_json(&cache.keys().await?);
        return Ok(());
    }

    let rows: Vec<KeyRow> = cache
        .store()
        .list()
        .await?
        .into_iter()
        .map(|meta| KeyRow {
            invalidate_at: meta
                .meta
                .get(fcache_core::types::meta::INVALIDATE_AT_KEY)
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
            size: output::format_bytes(meta.size),
            key: meta.key,
            name: meta.name,
            mime: meta.mime,
        })
        .collect();

    output::print_list(&rows, format);
    Ok(())
}
