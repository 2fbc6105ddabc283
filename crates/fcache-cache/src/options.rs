//! Loading cache options.

use std::sync::Arc;
use std::time::Duration;

use fcache_core::config::cache::CacheConfig;

use crate::logger::{Logger, TracingLogger};

/// Default period between invalidation sweeps.
pub const DEFAULT_INVALIDATE_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Options recognized by [`LoadingCache`](crate::LoadingCache).
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Diagnostic sink.
    pub logger: Arc<dyn Logger>,
    /// Period between sweeps. Zero disables the sweep, leaving expiration to
    /// the backend.
    pub invalidate_period: Duration,
    /// Whether a hit pushes the expiration further by the request TTL.
    pub extend_ttl: bool,
}

impl CacheOptions {
    /// Set the diagnostic sink.
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Set the period between invalidation sweeps.
    pub fn with_invalidation_period(mut self, period: Duration) -> Self {
        self.invalidate_period = period;
        self
    }

    /// Set whether hits extend the expiration.
    pub fn with_extend_ttl(mut self, extend: bool) -> Self {
        self.extend_ttl = extend;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            invalidate_period: DEFAULT_INVALIDATE_PERIOD,
            extend_ttl: false,
        }
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self::default()
            .with_invalidation_period(config.invalidate_period())
            .with_extend_ttl(config.extend_ttl)
    }
}
