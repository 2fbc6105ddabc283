//! # fcache-cache
//!
//! The loading cache: a read-through/write-through wrapper around any
//! [`Store`](fcache_core::Store).
//!
//! - [`LoadingCache::get_file`] returns cached content or runs a [`Loader`]
//!   on a miss, persisting the loaded content while streaming it back.
//! - [`LoadingCache::get_url`] does the same but answers with a direct URL.
//! - [`LoadingCache::run`] sweeps objects whose `_invalidate_at` has passed.

pub mod invalidation;
pub mod loader;
pub mod loading;
pub mod logger;
pub mod options;
pub mod scratch;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{GetRequest, Loader};
pub use loading::LoadingCache;
pub use logger::{Logger, NopLogger, TracingLogger};
pub use options::CacheOptions;
pub use scratch::ScratchFile;
pub use stats::CacheCounters;
