//! Test doubles shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use fcache_core::error::CacheError;
use fcache_core::result::CacheResult;
use fcache_core::traits::store::{
    ByteStream, GetUrlParams, Store, read_to_bytes, stream_from_bytes,
};
use fcache_core::types::meta::FileMeta;
use fcache_core::types::stats::StoreStats;

use crate::logger::{Level, Logger};

/// In-memory store that counts writes and fails operations on demand.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Bytes, FileMeta)>>,
    failing: Mutex<HashSet<&'static str>>,
    pub puts: AtomicUsize,
    pub updates: AtomicUsize,
    pub removes: AtomicUsize,
}

impl MemoryStore {
    /// Make every call of `op` fail with a backend error.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Insert an object directly, bypassing the counters.
    pub fn insert(&self, key: &str, content: &str, mut meta: FileMeta) {
        meta.key = key.to_string();
        meta.size = content.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::from(content.to_string()), meta));
    }

    pub fn object(&self, key: &str) -> Option<(Bytes, FileMeta)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn writes(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.removes.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str, key: &str) -> CacheResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(CacheError::backend(format!("{op} {key:?}: injected failure")));
        }
        Ok(())
    }

    fn missing(op: &str, key: &str) -> CacheError {
        CacheError::not_found(format!("{op} {key:?}"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn store_type(&self) -> &str {
        "memory"
    }

    async fn meta(&self, key: &str) -> CacheResult<FileMeta> {
        self.check("meta", key)?;
        self.object(key)
            .map(|(_, meta)| meta)
            .ok_or_else(|| Self::missing("meta", key))
    }

    async fn get(&self, key: &str) -> CacheResult<ByteStream> {
        self.check("get", key)?;
        self.object(key)
            .map(|(content, _)| stream_from_bytes(content))
            .ok_or_else(|| Self::missing("get", key))
    }

    async fn get_url(&self, key: &str, params: &GetUrlParams) -> CacheResult<String> {
        self.check("get_url", key)?;
        let (_, meta) = self.object(key).ok_or_else(|| Self::missing("get_url", key))?;
        let filename = params.filename.clone().unwrap_or(meta.name);
        Ok(format!("memory://{key}?filename={filename}"))
    }

    async fn put(&self, key: &str, meta: &FileMeta, content: ByteStream) -> CacheResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check("put", key)?;
        let content = read_to_bytes(content).await.map_err(|e| {
            CacheError::with_source(
                fcache_core::error::ErrorKind::Backend,
                format!("put {key:?}"),
                e,
            )
        })?;
        let mut meta = meta.clone();
        meta.key = key.to_string();
        meta.size = content.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content, meta));
        Ok(())
    }

    async fn update_meta(&self, key: &str, meta: &FileMeta) -> CacheResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check("update_meta", key)?;
        let mut objects = self.objects.lock().unwrap();
        let (_, stored) = objects
            .get_mut(key)
            .ok_or_else(|| Self::missing("update_meta", key))?;
        stored.name = meta.name.clone();
        stored.mime = meta.mime.clone();
        stored.meta = meta.meta.clone();
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.check("remove", key)?;
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Self::missing("remove", key))
    }

    async fn stat(&self) -> CacheResult<StoreStats> {
        self.check("stat", "")?;
        let objects = self.objects.lock().unwrap();
        Ok(StoreStats {
            keys: objects.len() as u64,
            size: objects.values().map(|(content, _)| content.len() as u64).sum(),
        })
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.check("keys", "")?;
        Ok(self.objects.lock().unwrap().keys().cloned().collect())
    }

    async fn list(&self) -> CacheResult<Vec<FileMeta>> {
        self.check("list", "")?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .map(|(_, meta)| meta.clone())
            .collect())
    }
}

/// Logger that keeps every line.
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingLogger {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.lines.lock().unwrap().push((level, args.to_string()));
    }
}

/// Clock that tests move by hand.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualClock {
    offset_secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 5, 6, 0, 0).unwrap()
    }

    /// Move the clock to `epoch + offset`.
    pub fn set(&self, offset: chrono::Duration) {
        self.offset_secs
            .store(offset.num_seconds(), Ordering::SeqCst);
    }

    pub fn now(&self) -> DateTime<Utc> {
        Self::epoch() + chrono::Duration::seconds(self.offset_secs.load(Ordering::SeqCst))
    }
}
