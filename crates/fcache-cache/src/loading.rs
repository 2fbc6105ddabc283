//! The loading cache.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;
use fcache_core::traits::store::{ByteStream, GetUrlParams, Store};
use fcache_core::types::meta::FileMeta;
use fcache_core::types::stats::CacheStats;

use crate::loader::{GetRequest, Loader, watch};
use crate::options::CacheOptions;
use crate::scratch;
use crate::stats::CacheCounters;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Read-through/write-through cache in front of a [`Store`].
///
/// Shared by `Arc`; every request runs on the caller's task. The cache owns a
/// root [`CancellationToken`] that every request and the invalidation loop
/// race against, so [`shutdown`](Self::shutdown) stops all of them.
pub struct LoadingCache {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) options: CacheOptions,
    pub(crate) counters: CacheCounters,
    pub(crate) cancel: CancellationToken,
    pub(crate) now: Clock,
}

impl LoadingCache {
    pub fn new(store: Arc<dyn Store>, options: CacheOptions) -> Self {
        Self {
            store,
            options,
            counters: CacheCounters::default(),
            cancel: CancellationToken::new(),
            now: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used for expiration stamps and sweeps.
    pub fn with_clock<F>(mut self, now: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.now = Arc::new(now);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    /// The root token. Cancelling it is equivalent to [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel in-flight requests and stop the invalidation loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Return the cached content of `req.key`, loading and storing it on a
    /// miss.
    ///
    /// On a miss the loaded content is written to the store while being
    /// copied to a scratch file; the returned stream reads that copy and
    /// deletes it on drop.
    pub async fn get_file(&self, req: GetRequest) -> CacheResult<(ByteStream, FileMeta)> {
        self.guarded(self.get_file_inner(req)).await
    }

    /// Return a direct URL for `req.key`, loading and storing it on a miss.
    pub async fn get_url(
        &self,
        req: GetRequest,
        params: &GetUrlParams,
    ) -> CacheResult<(String, FileMeta)> {
        self.guarded(self.get_url_inner(req, params)).await
    }

    /// Current counters together with the store's stats.
    pub async fn stat(&self) -> CacheResult<CacheStats> {
        let store = self.store.stat().await.map_err(|e| self.record(e))?;
        Ok(self.counters.snapshot(store))
    }

    pub async fn keys(&self) -> CacheResult<Vec<String>> {
        self.store.keys().await.map_err(|e| self.record(e))
    }

    async fn get_file_inner(&self, req: GetRequest) -> CacheResult<(ByteStream, FileMeta)> {
        let ttl = validate(&req)?;
        let GetRequest { key, loader, .. } = req;

        if let Some(meta) = self.lookup(&key).await? {
            self.counters.hit();
            let content = self.store.get(&key).await.map_err(|e| self.record(e))?;
            let meta = self.extend_ttl(&key, meta, ttl).await?;
            return Ok((content, meta));
        }

        self.counters.miss();
        // Cancels the loader's token once the request ends or is dropped.
        let cancel = self.cancel.child_token();
        let _guard = cancel.clone().drop_guard();
        let (content, meta) = self.load(&key, loader, cancel, ttl).await?;

        let copy = scratch::tee(content, |stream| self.store.put(&key, &meta, stream))
            .await
            .map_err(|e| self.record(e))?;

        debug!(key = %key, "Loaded file into cache");
        Ok((Box::pin(copy), meta))
    }

    async fn get_url_inner(
        &self,
        req: GetRequest,
        params: &GetUrlParams,
    ) -> CacheResult<(String, FileMeta)> {
        let ttl = validate(&req)?;
        let GetRequest { key, loader, .. } = req;

        let meta = match self.lookup(&key).await? {
            Some(meta) => {
                self.counters.hit();
                self.extend_ttl(&key, meta, ttl).await?
            }
            None => {
                self.counters.miss();
                let cancel = self.cancel.child_token();
                let _guard = cancel.clone().drop_guard();
                let (content, meta) = self.load(&key, loader, cancel, ttl).await?;
                let (content, failed) = watch(content);
                self.store.put(&key, &meta, content).await.map_err(|e| {
                    // the store only saw the loader's own read failure
                    if failed.load(Ordering::Relaxed) {
                        CacheError::with_source(
                            ErrorKind::Loader,
                            format!("read loaded content for {key:?}"),
                            e,
                        )
                    } else {
                        self.record(e)
                    }
                })?;
                debug!(key = %key, "Loaded file into cache");
                meta
            }
        };

        let url = self
            .store
            .get_url(&key, params)
            .await
            .map_err(|e| self.record(e))?;
        Ok((url, meta))
    }

    /// `Some` on a hit, `None` on a miss.
    async fn lookup(&self, key: &str) -> CacheResult<Option<FileMeta>> {
        match self.store.meta(key).await {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(self.record(err)),
        }
    }

    /// Run the loader and stamp the expiration on its metadata.
    async fn load(
        &self,
        key: &str,
        loader: Loader,
        cancel: CancellationToken,
        ttl: chrono::Duration,
    ) -> CacheResult<(ByteStream, FileMeta)> {
        let (content, mut meta) = loader.load(cancel).await.map_err(|e| {
            CacheError::with_source(ErrorKind::Loader, format!("load {key:?}"), e)
        })?;

        meta.key = key.to_string();
        meta.set_invalidate_at(deadline((self.now)(), ttl, key)?);
        Ok((content, meta))
    }

    /// Push the expiration of a hit further by `ttl` when enabled.
    async fn extend_ttl(
        &self,
        key: &str,
        mut meta: FileMeta,
        ttl: chrono::Duration,
    ) -> CacheResult<FileMeta> {
        if !self.options.extend_ttl {
            return Ok(meta);
        }

        let from = match meta.invalidate_at() {
            Some(at) => at?,
            None => (self.now)(),
        };
        let at = deadline(from, ttl, key)?;
        meta.set_invalidate_at(at);

        self.store
            .update_meta(key, &meta)
            .await
            .map_err(|e| self.record(e))?;

        debug!(key = %key, invalidate_at = %at, "Extended TTL");
        Ok(meta)
    }

    async fn guarded<T>(&self, request: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CacheError::cancelled("cache is shut down")),
            result = request => result,
        }
    }

    /// Count backend and scratch failures. Absence, loader failures and bad
    /// requests are not cache errors.
    pub(crate) fn record(&self, err: CacheError) -> CacheError {
        if matches!(err.kind, ErrorKind::Backend | ErrorKind::Scratch) {
            self.counters.error();
        }
        err
    }
}

impl fmt::Debug for LoadingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

fn validate(req: &GetRequest) -> CacheResult<chrono::Duration> {
    if req.key.is_empty() {
        return Err(CacheError::invalid_request("key must not be empty"));
    }
    chrono::Duration::from_std(req.ttl).map_err(|e| {
        CacheError::with_source(
            ErrorKind::InvalidRequest,
            format!("ttl {:?} of {:?} is out of range", req.ttl, req.key),
            e,
        )
    })
}

fn deadline(from: DateTime<Utc>, ttl: chrono::Duration, key: &str) -> CacheResult<DateTime<Utc>> {
    from.checked_add_signed(ttl).ok_or_else(|| {
        CacheError::invalid_request(format!("expiration of {key:?} is out of range"))
    })
}
