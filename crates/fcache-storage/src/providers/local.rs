//! Local filesystem store.
//!
//! Every object is two files in a flat root directory: `<key>.blob` with the
//! content and `<key>.meta.json` with the serialized [`FileMeta`]. Keys are
//! percent-encoded so any key maps to exactly one file name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;
use fcache_core::traits::store::{ByteStream, GetUrlParams, Store};
use fcache_core::types::{FileMeta, StoreStats};

const BLOB_SUFFIX: &str = ".blob";
const META_SUFFIX: &str = ".meta.json";
const TEMP_PREFIX: &str = ".tmp-";

/// Local filesystem store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    /// Absolute root directory for all stored objects.
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store rooted at the given path, creating it if needed.
    pub async fn new(root_path: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root_path.as_ref();
        fs::create_dir_all(root).await.map_err(|e| {
            CacheError::with_source(
                ErrorKind::Backend,
                format!("Failed to create store root: {}", root.display()),
                e,
            )
        })?;
        let root = fs::canonicalize(root).await.map_err(|e| {
            CacheError::with_source(
                ErrorKind::Backend,
                format!("Failed to resolve store root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{BLOB_SUFFIX}", urlencoding::encode(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{META_SUFFIX}", urlencoding::encode(key)))
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    async fn read_meta(&self, key: &str) -> CacheResult<FileMeta> {
        let data = fs::read(self.meta_path(key))
            .await
            .map_err(|e| io_error(e, "meta", key))?;
        let mut meta: FileMeta = serde_json::from_slice(&data).map_err(|e| {
            CacheError::with_source(
                ErrorKind::Backend,
                format!("Failed to decode metadata of {key:?}"),
                e,
            )
        })?;
        meta.key = key.to_string();
        Ok(meta)
    }

    /// Write the sidecar through a temporary file so readers never observe a
    /// partially written document.
    async fn write_meta(&self, key: &str, meta: &FileMeta) -> CacheResult<()> {
        let data = serde_json::to_vec_pretty(meta)?;
        let temp = TempFile::new(self.temp_path());
        fs::write(temp.path(), &data)
            .await
            .map_err(|e| io_error(e, "write metadata", key))?;
        fs::rename(temp.path(), self.meta_path(key))
            .await
            .map_err(|e| io_error(e, "commit metadata", key))?;
        temp.commit();
        Ok(())
    }

    async fn write_blob(&self, key: &str, mut content: ByteStream) -> CacheResult<u64> {
        let temp = TempFile::new(self.temp_path());
        let mut file = fs::File::create(temp.path())
            .await
            .map_err(|e| io_error(e, "create blob", key))?;

        let mut total_bytes = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| {
                CacheError::with_source(
                    ErrorKind::Backend,
                    format!("Failed to read content for {key:?}"),
                    e,
                )
            })?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(e, "write blob", key))?;
        }

        file.flush()
            .await
            .map_err(|e| io_error(e, "flush blob", key))?;
        drop(file);

        fs::rename(temp.path(), self.blob_path(key))
            .await
            .map_err(|e| io_error(e, "commit blob", key))?;
        temp.commit();
        Ok(total_bytes)
    }
}

/// Temporary file in the store root, removed on drop unless committed.
///
/// Covers every early return of a write as well as a dropped future.
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing left to clean up.
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl Store for LocalStore {
    fn store_type(&self) -> &str {
        "local"
    }

    async fn meta(&self, key: &str) -> CacheResult<FileMeta> {
        self.read_meta(key).await
    }

    async fn get(&self, key: &str) -> CacheResult<ByteStream> {
        let file = fs::File::open(self.blob_path(key))
            .await
            .map_err(|e| io_error(e, "get", key))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    /// Local files have no signed form; the URL is a plain `file://` URL and
    /// neither the expiry nor the filename override can be expressed in it.
    async fn get_url(&self, key: &str, params: &GetUrlParams) -> CacheResult<String> {
        let path = self.blob_path(key);
        fs::metadata(&path)
            .await
            .map_err(|e| io_error(e, "get url", key))?;
        debug!(key, filename = ?params.filename, "Local store URL ignores download parameters");
        url::Url::from_file_path(&path)
            .map(|u| u.to_string())
            .map_err(|()| CacheError::backend(format!("Path of {key:?} is not a valid file URL")))
    }

    async fn put(&self, key: &str, meta: &FileMeta, content: ByteStream) -> CacheResult<()> {
        let size = self.write_blob(key, content).await?;

        let mut stored = meta.clone();
        stored.key = key.to_string();
        stored.size = size;
        stored.created_at = Some(chrono::Utc::now());
        self.write_meta(key, &stored).await?;

        debug!(key, bytes = size, "Stored file");
        Ok(())
    }

    async fn update_meta(&self, key: &str, meta: &FileMeta) -> CacheResult<()> {
        let current = self.read_meta(key).await?;
        let updated = FileMeta {
            name: meta.name.clone(),
            mime: meta.mime.clone(),
            meta: meta.meta.clone(),
            ..current
        };
        self.write_meta(key, &updated).await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        fs::remove_file(self.blob_path(key))
            .await
            .map_err(|e| io_error(e, "remove", key))?;
        match fs::remove_file(self.meta_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e, "remove metadata", key)),
        }
    }

    async fn stat(&self) -> CacheResult<StoreStats> {
        let metas = self.list().await?;
        Ok(StoreStats {
            keys: metas.len() as u64,
            size: metas.iter().map(|m| m.size).sum(),
        })
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.list().await?.into_iter().map(|m| m.key).collect())
    }

    async fn list(&self) -> CacheResult<Vec<FileMeta>> {
        let mut dir = fs::read_dir(&self.root).await.map_err(|e| {
            CacheError::with_source(
                ErrorKind::Backend,
                format!("Failed to list store root: {}", self.root.display()),
                e,
            )
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| {
            CacheError::with_source(ErrorKind::Backend, "Failed to read directory entry", e)
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(encoded) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            let key = match urlencoding::decode(encoded) {
                Ok(key) => key.into_owned(),
                Err(_) => continue,
            };
            match self.read_meta(&key).await {
                Ok(meta) => entries.push(meta),
                // removed concurrently
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

fn io_error(err: std::io::Error, op: &str, key: &str) -> CacheError {
    if err.kind() == std::io::ErrorKind::NotFound {
        CacheError::not_found(format!("{op} {key:?}: not found"))
    } else {
        CacheError::with_source(ErrorKind::Backend, format!("{op} {key:?}"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcache_core::traits::store::{read_to_bytes, stream_from_bytes};

    async fn make_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let (_dir, store) = make_store().await;
        let meta = FileMeta::new("a.txt", "text/plain", 0).with_meta("owner", "alice");

        store
            .put("docs/a", &meta, stream_from_bytes("hello world"))
            .await
            .unwrap();

        let stored = store.meta("docs/a").await.unwrap();
        assert_eq!(stored.name, "a.txt");
        assert_eq!(stored.mime, "text/plain");
        assert_eq!(stored.size, 11);
        assert_eq!(stored.key, "docs/a");
        assert_eq!(stored.meta, meta.meta);
        assert!(stored.created_at.is_some());

        let content = read_to_bytes(store.get("docs/a").await.unwrap()).await.unwrap();
        assert_eq!(&content[..], b"hello world");

        store.remove("docs/a").await.unwrap();
        assert!(store.meta("docs/a").await.unwrap_err().is_not_found());
        assert!(store.remove("docs/a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let (_dir, store) = make_store().await;
        assert!(store.meta("nope").await.unwrap_err().is_not_found());
        assert!(store.get("nope").await.err().unwrap().is_not_found());
        assert!(
            store
                .get_url("nope", &GetUrlParams::default())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            store
                .update_meta("nope", &FileMeta::default())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_update_meta_keeps_content() {
        let (_dir, store) = make_store().await;
        store
            .put("k", &FileMeta::new("a.txt", "text/plain", 0), stream_from_bytes("abc"))
            .await
            .unwrap();

        let mut meta = store.meta("k").await.unwrap();
        meta.meta.insert("x".into(), "y".into());
        store.update_meta("k", &meta).await.unwrap();

        let updated = store.meta("k").await.unwrap();
        assert_eq!(updated.meta.get("x").map(String::as_str), Some("y"));
        assert_eq!(updated.size, 3);
        let content = read_to_bytes(store.get("k").await.unwrap()).await.unwrap();
        assert_eq!(&content[..], b"abc");
    }

    #[tokio::test]
    async fn test_list_keys_and_stat() {
        let (_dir, store) = make_store().await;
        assert_eq!(store.stat().await.unwrap(), StoreStats::default());

        for (key, body) in [("b", "22"), ("a/1", "1"), ("c", "333")] {
            store
                .put(key, &FileMeta::new(key, "text/plain", 0), stream_from_bytes(body))
                .await
                .unwrap();
        }

        assert_eq!(store.keys().await.unwrap(), vec!["a/1", "b", "c"]);
        assert_eq!(store.stat().await.unwrap(), StoreStats { keys: 3, size: 6 });
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_object() {
        let (_dir, store) = make_store().await;
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from("partial")),
            Err(std::io::Error::other("upstream closed")),
        ];
        let err = store
            .put("k", &FileMeta::default(), Box::pin(futures::stream::iter(chunks)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Backend);
        assert!(store.keys().await.unwrap().is_empty());
        assert!(store.meta("k").await.unwrap_err().is_not_found());
        assert_eq!(dir_entries(&store), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_cancelled_put_leaves_no_temp_file() {
        let (_dir, store) = make_store().await;
        let content = futures::stream::once(async { Ok::<_, std::io::Error>(bytes::Bytes::from("partial")) })
            .chain(futures::stream::pending());

        let meta = FileMeta::default();
        let put = store.put("k", &meta, Box::pin(content));
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), put).await;
        assert!(result.is_err());

        assert_eq!(dir_entries(&store), Vec::<String>::new());
        assert!(store.meta("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_temp_file() {
        let (_dir, store) = make_store().await;
        // a directory in place of the blob makes the final rename fail
        std::fs::create_dir(store.blob_path("k")).unwrap();
        std::fs::write(store.blob_path("k").join("inner"), b"x").unwrap();

        let err = store
            .put("k", &FileMeta::default(), stream_from_bytes("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Backend);

        assert_eq!(dir_entries(&store), vec!["k.blob".to_string()]);
    }

    #[test]
    fn test_uncommitted_temp_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tmp-x");
        std::fs::write(&path, b"x").unwrap();
        drop(TempFile::new(path.clone()));
        assert!(!path.exists());

        let kept = dir.path().join(".tmp-y");
        std::fs::write(&kept, b"y").unwrap();
        TempFile::new(kept.clone()).commit();
        assert!(kept.exists());
    }

    fn dir_entries(store: &LocalStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_get_url_is_file_url() {
        let (_dir, store) = make_store().await;
        store
            .put("k", &FileMeta::default(), stream_from_bytes("x"))
            .await
            .unwrap();
        let url = store.get_url("k", &GetUrlParams::default()).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("k.blob"));
    }
}
