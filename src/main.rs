//! fcache daemon
//!
//! Builds the configured store, wraps it in a loading cache and runs the
//! invalidation loop until Ctrl-C or SIGTERM.

use std::future::Future;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use fcache_cache::{CacheOptions, LoadingCache};
use fcache_core::config::FcacheConfig;
use fcache_core::error::{CacheError, ErrorKind};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, shutdown_signal()).await {
        tracing::error!("fcache error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<FcacheConfig, CacheError> {
    let config_path =
        std::env::var("FCACHE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    let env = std::env::var("FCACHE_ENV").unwrap_or_else(|_| "development".to_string());

    FcacheConfig::load(&config_path, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &FcacheConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Run the invalidation loop until `shutdown` resolves
async fn run(config: FcacheConfig, shutdown: impl Future<Output = ()>) -> Result<(), CacheError> {
    tracing::info!("Starting fcache v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Initialize store ─────────────────────────────────
    let store = fcache_storage::build_store(&config.storage).await?;
    let stats = store.stat().await?;
    tracing::info!(
        store = store.store_type(),
        keys = stats.keys,
        size = stats.size,
        "Store ready"
    );

    // ── Step 2: Create loading cache ─────────────────────────────
    let cache = Arc::new(LoadingCache::new(store, CacheOptions::from(&config.cache)));

    if config.cache.invalidate_period_seconds == 0 {
        tracing::info!("Invalidation disabled, expiration is left to the store");
        shutdown.await;
        cache.shutdown();
        return Ok(());
    }

    // ── Step 3: Start invalidation loop ──────────────────────────
    let sweeper = cache.spawn_invalidation();

    // ── Step 4: Wait for shutdown ────────────────────────────────
    shutdown.await;
    tracing::info!("Shutdown signal received, stopping invalidation loop");
    cache.shutdown();

    match sweeper.await {
        Ok(Err(e)) if e.kind == ErrorKind::Cancelled => {}
        Ok(Err(e)) => return Err(e),
        Ok(Ok(())) => {}
        Err(e) => {
            return Err(CacheError::with_source(
                ErrorKind::Backend,
                "invalidation task panicked",
                e,
            ));
        }
    }

    tracing::info!("fcache stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
