//! Store trait for pluggable durable blob backends.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::result::CacheResult;
use crate::types::meta::FileMeta;
use crate::types::stats::StoreStats;

/// A byte stream type used for reading and writing file contents.
///
/// Dropping the stream closes it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Parameters, besides the key, used to form a direct-access URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetUrlParams {
    /// Download file name to advertise instead of the stored one.
    pub filename: Option<String>,
    /// How long the URL stays valid.
    pub expires: Duration,
}

/// Trait for durable blob backends.
///
/// Implementations exist for the local filesystem and S3-compatible object
/// storage. Every method reports an absent key as
/// [`ErrorKind::NotFound`](crate::error::ErrorKind::NotFound) and every
/// other failure as [`ErrorKind::Backend`](crate::error::ErrorKind::Backend).
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug + 'static {
    /// Return the store type name (e.g., "local", "s3").
    fn store_type(&self) -> &str;

    /// Fetch metadata without transferring content.
    async fn meta(&self, key: &str) -> CacheResult<FileMeta>;

    /// Fetch the full content as a lazily read stream.
    async fn get(&self, key: &str) -> CacheResult<ByteStream>;

    /// Produce a time-limited direct-access URL.
    async fn get_url(&self, key: &str, params: &GetUrlParams) -> CacheResult<String>;

    /// Store content and metadata, overwriting any existing object.
    ///
    /// The store consumes `content` to its end or drops it on failure.
    async fn put(&self, key: &str, meta: &FileMeta, content: ByteStream) -> CacheResult<()>;

    /// Replace the metadata of an existing object without rewriting content.
    async fn update_meta(&self, key: &str, meta: &FileMeta) -> CacheResult<()>;

    /// Remove an object.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Count stored objects and their total size.
    async fn stat(&self) -> CacheResult<StoreStats>;

    /// All stored keys, in order.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Metadata of every stored object, in key order.
    async fn list(&self) -> CacheResult<Vec<FileMeta>>;
}

/// Wrap an in-memory buffer as a [`ByteStream`].
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into memory.
pub async fn read_to_bytes(mut stream: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
