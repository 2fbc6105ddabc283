//! `fetch` command.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use futures::StreamExt;
use serde::Serialize;
use tabled::Tabled;
use tokio_util::io::ReaderStream;

use fcache_cache::loader::LoadResult;
use fcache_cache::{GetRequest, Loader, LoadingCache};
use fcache_core::config::FcacheConfig;
use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;
use fcache_core::traits::store::{ByteStream, GetUrlParams};
use fcache_core::types::meta::{FileMeta, INVALIDATE_AT_KEY};

use crate::output::{self, OutputFormat};

/// Arguments for the fetch command
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Cache key
    pub key: String,
    /// Local file loaded on a miss
    #[arg(long)]
    pub from: PathBuf,
    /// TTL in seconds (defaults to `cache.default_ttl_seconds`)
    #[arg(long)]
    pub ttl: Option<u64>,
    /// MIME type recorded for the file
    #[arg(long, default_value = "application/octet-stream")]
    pub mime: String,
    /// Print a direct URL instead of reading the content
    #[arg(long)]
    pub url: bool,
    /// URL lifetime in seconds
    #[arg(long, default_value_t = 900)]
    pub expires: u64,
    /// Download file name advertised by the URL
    #[arg(long)]
    pub filename: Option<String>,
}

/// Fetch result row
#[derive(Debug, Serialize, Tabled)]
struct FetchRow {
    key: String,
    name: String,
    mime: String,
    size: String,
    source: String,
    invalidate_at: String,
    /// Bytes read from the cache, or the direct URL
    result: String,
}

/// Execute the fetch command
pub async fn execute(
    args: &FetchArgs,
    cache: &LoadingCache,
    config: &FcacheConfig,
    format: OutputFormat,
) -> CacheResult<()> {
    let ttl = args
        .ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.cache.default_ttl());
    let request = GetRequest::new(&args.key, ttl, file_loader(args.from.clone(), &args.mime));
    let hits = cache.counters().hits();

    let (meta, result) = if args.url {
        let params = GetUrlParams {
            filename: args.filename.clone(),
            expires: Duration::from_secs(args.expires),
        };
        let (url, meta) = cache.get_url(request, &params).await?;
        (meta, url)
    } else {
        let (mut content, meta) = cache.get_file(request).await?;
        let mut read = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| {
                CacheError::with_source(ErrorKind::Backend, "read cached content", e)
            })?;
            read += chunk.len() as u64;
        }
        (meta, format!("{} bytes", read))
    };

    let row = FetchRow {
        source: if cache.counters().hits() > hits { "hit" } else { "miss" }.to_string(),
        invalidate_at: meta
            .meta
            .get(INVALIDATE_AT_KEY)
            .cloned()
            .unwrap_or_else(|| "-".to_string()),
        size: output::format_bytes(meta.size),
        key: args.key.clone(),
        name: meta.name,
        mime: meta.mime,
        result,
    };
    output::print_item(&row, format);
    Ok(())
}

/// Loader reading a local file
fn file_loader(path: PathBuf, mime: &str) -> Loader {
    let mime = mime.to_string();
    Loader::new(move |_| async move {
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content: ByteStream = Box::pin(ReaderStream::new(file));
        LoadResult::Ok((content, FileMeta::new(name, mime, size)))
    })
}
