//! Core traits defined in `fcache-core` and implemented by other crates.

pub mod store;

pub use store::Store;
