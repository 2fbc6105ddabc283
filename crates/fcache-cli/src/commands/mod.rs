//! CLI command definitions and dispatch.

pub mod fetch;
pub mod keys;
pub mod stat;
pub mod sweep;

use clap::{Parser, Subcommand};
use tracing::debug;

use fcache_cache::{CacheOptions, LoadingCache};
use fcache_core::config::FcacheConfig;
use fcache_core::result::CacheResult;

use crate::output::OutputFormat;

/// fcache: read-through/write-through file cache
#[derive(Debug, Parser)]
#[command(name = "fcache-cli", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Environment overlay (`config/<env>.toml`)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show cache and store statistics
    Stat,
    /// List stored keys
    Keys,
    /// Run one invalidation pass
    Sweep,
    /// Load a local file through the cache
    Fetch(fetch::FetchArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> CacheResult<()> {
        let config = FcacheConfig::load(&self.config, &self.env)?;
        let cache = open_cache(&config).await?;
        debug!(
            command = ?self.command,
            config = %self.config,
            env = %self.env,
            store = cache.store().store_type(),
            "Dispatching command"
        );

        match &self.command {
            Commands::Stat => stat::execute(&cache, self.format).await,
            Commands::Keys => keys::execute(&cache, self.format).await,
            Commands::Sweep => sweep::execute(&cache, self.format).await,
            Commands::Fetch(args) => fetch::execute(args, &cache, &config, self.format).await,
        }
    }
}

/// Helper: build the configured store and wrap it in a cache
pub async fn open_cache(config: &FcacheConfig) -> CacheResult<LoadingCache> {
    let store = fcache_storage::build_store(&config.storage).await?;
    debug!(provider = %config.storage.provider, "Opened store");
    Ok(LoadingCache::new(store, CacheOptions::from(&config.cache)))
}
