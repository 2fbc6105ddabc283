//! # fcache-core
//!
//! Core crate for fcache. Contains the [`Store`](traits::store::Store)
//! capability trait that every backend implements, the file metadata and
//! stats types, configuration schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other fcache crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{CacheError, ErrorKind, InvalidationError};
pub use result::CacheResult;
pub use traits::store::{ByteStream, GetUrlParams, Store};
pub use types::meta::FileMeta;
pub use types::stats::{CacheStats, StoreStats};
