//! Miss-path content producers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use fcache_core::error::BoxError;
use fcache_core::traits::store::{ByteStream, stream_from_bytes};
use fcache_core::types::meta::FileMeta;

/// What a loader yields: the content and its metadata.
pub type LoadResult = Result<(ByteStream, FileMeta), BoxError>;

type LoadFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, LoadResult> + Send>;

/// One-shot producer of a file's content, run on a cache miss.
///
/// The token it receives is cancelled when the request is dropped or the
/// cache shuts down.
pub struct Loader(LoadFn);

impl Loader {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        Self(Box::new(move |cancel| Box::pin(f(cancel))))
    }

    /// A loader that yields an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>, meta: FileMeta) -> Self {
        let data = data.into();
        Self::new(move |_| async move { Ok((stream_from_bytes(data), meta)) })
    }

    pub(crate) async fn load(self, cancel: CancellationToken) -> LoadResult {
        (self.0)(cancel).await
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Loader")
    }
}

/// Wrap loaded content so a read failure stays visible after the stream
/// has been handed to a store.
pub(crate) fn watch(content: ByteStream) -> (ByteStream, Arc<AtomicBool>) {
    let failed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed);
    let content: ByteStream = Box::pin(content.inspect(move |chunk| {
        if chunk.is_err() {
            flag.store(true, Ordering::Relaxed);
        }
    }));
    (content, failed)
}

/// A request for one key.
#[derive(Debug)]
pub struct GetRequest {
    /// Store key, must not be empty.
    pub key: String,
    /// Lifetime counted from the miss-triggered write. Zero expires the
    /// object at the next sweep.
    pub ttl: Duration,
    /// Runs only on a miss.
    pub loader: Loader,
}

impl GetRequest {
    pub fn new(key: impl Into<String>, ttl: Duration, loader: Loader) -> Self {
        Self {
            key: key.into(),
            ttl,
            loader,
        }
    }
}
