//! # fcache-storage
//!
//! Store implementations for fcache. Supports the local filesystem and
//! S3-compatible object stores; the implementation is selected at runtime
//! from configuration.

pub mod providers;

use std::sync::Arc;

use tracing::info;

use fcache_core::config::storage::StorageConfig;
use fcache_core::error::CacheError;
use fcache_core::result::CacheResult;
use fcache_core::traits::store::Store;

#[cfg(feature = "local")]
pub use providers::local::LocalStore;
#[cfg(feature = "s3")]
pub use providers::s3::S3Store;

/// Build the store selected by `config.provider`.
pub async fn build_store(config: &StorageConfig) -> CacheResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.provider.as_str() {
        #[cfg(feature = "local")]
        "local" => {
            info!(root = %config.local.root_path, "Initializing local store");
            Arc::new(LocalStore::new(&config.local.root_path).await?)
        }
        #[cfg(feature = "s3")]
        "s3" => Arc::new(S3Store::from_config(&config.s3).await?),
        other => {
            return Err(CacheError::configuration(format!(
                "Unknown store provider: '{other}'. Supported: local, s3"
            )));
        }
    };
    Ok(store)
}
