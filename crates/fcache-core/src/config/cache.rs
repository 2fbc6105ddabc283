//! Loading cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Loading cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied to files loaded through the binaries, in seconds.
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    /// Period between invalidation sweeps in seconds (0 disables the sweep).
    #[serde(default = "default_invalidate_period")]
    pub invalidate_period_seconds: u64,
    /// Whether a hit pushes the expiration further by the request TTL.
    #[serde(default)]
    pub extend_ttl: bool,
}

impl CacheConfig {
    /// Default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Invalidation period as a [`Duration`].
    pub fn invalidate_period(&self) -> Duration {
        Duration::from_secs(self.invalidate_period_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl(),
            invalidate_period_seconds: default_invalidate_period(),
            extend_ttl: false,
        }
    }
}

fn default_ttl() -> u64 {
    1800
}

fn default_invalidate_period() -> u64 {
    900
}
