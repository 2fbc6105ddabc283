//! `sweep` command.

use serde::Serialize;
use tabled::Tabled;

use fcache_cache::LoadingCache;
use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;

use crate::output::{self, OutputFormat};

/// Sweep result row
#[derive(Debug, Serialize, Tabled)]
struct SweepRow {
    removed: u64,
    errors: usize,
}

/// Execute one invalidation pass; a pass with failures exits non-zero
pub async fn execute(cache: &LoadingCache, format: OutputFormat) -> CacheResult<()> {
    match cache.invalidate().await {
        Ok(removed) => {
            if format == OutputFormat::Table {
                output::print_success(&format!("Removed {} expired file(s)", removed));
            } else {
                output::print_item(&SweepRow { removed, errors: 0 }, format);
            }
            Ok(())
        }
        Err(err) => {
            if format == OutputFormat::Table {
                output::print_warning(&err.to_string());
            } else {
                output::print_item(
                    &SweepRow {
                        removed: err.removed,
                        errors: err.len(),
                    },
                    format,
                );
                for e in &err.errors {
                    output::print_error(&e.to_string());
                }
            }
            let kind = err.errors.first().map_or(ErrorKind::Backend, |e| e.kind);
            Err(CacheError::with_source(
                kind,
                format!("Sweep finished with {} error(s)", err.len()),
                err,
            ))
        }
    }
}
