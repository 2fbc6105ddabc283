//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fcache_cache::loader::LoadResult;
use fcache_cache::{CacheOptions, Loader, LoadingCache, NopLogger};
use fcache_core::traits::store::{ByteStream, read_to_bytes};
use fcache_core::types::meta::FileMeta;
use fcache_storage::LocalStore;

/// Test application context
pub struct TestCache {
    /// The cache under test
    pub cache: Arc<LoadingCache>,
    /// The store behind it
    pub store: Arc<LocalStore>,
    /// Seconds added to [`TestCache::epoch`] by the cache's clock
    offset_secs: Arc<AtomicI64>,
    /// Keeps the store directory alive
    _dir: TempDir,
}

impl TestCache {
    /// Create a cache over an empty local store
    pub async fn new(options: CacheOptions) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Arc::new(
            LocalStore::new(dir.path())
                .await
                .expect("Failed to init local store"),
        );

        let offset_secs = Arc::new(AtomicI64::new(0));
        let offset = Arc::clone(&offset_secs);
        let cache = LoadingCache::new(store.clone(), options.with_logger(NopLogger))
            .with_clock(move || {
                Self::epoch() + chrono::Duration::seconds(offset.load(Ordering::SeqCst))
            });

        Self {
            cache: Arc::new(cache),
            store,
            offset_secs,
            _dir: dir,
        }
    }

    /// Fixed instant the clock starts from
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 5, 6, 0, 0).unwrap()
    }

    /// Move the cache's clock to `epoch + offset`
    pub fn set_clock(&self, offset: chrono::Duration) {
        self.offset_secs
            .store(offset.num_seconds(), Ordering::SeqCst);
    }
}

/// Loader yielding `content` as a text file
pub fn text_loader(name: &str, content: &'static str) -> Loader {
    Loader::from_bytes(
        content,
        FileMeta::new(name, "text/plain", content.len() as u64),
    )
}

async fn never_load(_cancel: CancellationToken) -> LoadResult {
    panic!("loader must not run on a hit")
}

/// Loader that fails the test if it runs
pub fn unreachable_loader() -> Loader {
    Loader::new(never_load)
}

/// Loader whose content stream fails after a few bytes
pub fn broken_loader() -> Loader {
    Loader::new(|_| async {
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from("hel")),
            Err(std::io::Error::other("connection reset")),
        ];
        let content: ByteStream = Box::pin(futures::stream::iter(chunks));
        LoadResult::Ok((content, FileMeta::new("a.txt", "text/plain", 5)))
    })
}

/// Drain a content stream
pub async fn read_all(content: ByteStream) -> Bytes {
    read_to_bytes(content).await.expect("Failed to read content")
}
