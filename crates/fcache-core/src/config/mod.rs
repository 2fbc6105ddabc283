//! Configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from a
//! TOML file, an optional environment overlay, and `FCACHE__*` environment
//! variables. Each sub-module is one logical section.

pub mod cache;
pub mod logging;
pub mod storage;

use serde::{Deserialize, Serialize};

use self::cache::CacheConfig;
use self::logging::LoggingConfig;
use self::storage::StorageConfig;

use crate::error::CacheError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FcacheConfig {
    /// Loading cache behaviour.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Backend store selection and settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FcacheConfig {
    /// Load configuration.
    ///
    /// Merges `config_path`, the overlay `config/{env}` and environment
    /// variables prefixed with `FCACHE` (nested with `__`, e.g.
    /// `FCACHE__STORAGE__S3__BUCKET`). Missing files are skipped.
    pub fn load(config_path: &str, env: &str) -> Result<Self, CacheError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("FCACHE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CacheError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| CacheError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
