//! Convenience result type alias for fcache.

use crate::error::CacheError;

/// A specialized `Result` type for fcache operations.
///
/// Stores, the loading cache and the binaries all propagate
/// [`CacheError`], so every crate uses this alias instead of spelling it out.
pub type CacheResult<T> = Result<T, CacheError>;
