//! Core type definitions shared by stores and the loading cache.

pub mod meta;
pub mod stats;

pub use meta::{FileMeta, INVALIDATE_AT_KEY};
pub use stats::{CacheStats, StoreStats};
