//! Disk-backed duplication of loader content.
//!
//! On a miss the loader's stream has to reach both the store and the
//! caller. Each chunk is appended to a temporary file and forwarded to the
//! store through a bounded channel. Once the store has the whole object the
//! file is rewound and handed to the caller as a [`ScratchFile`].

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;
use fcache_core::traits::store::ByteStream;

/// Chunks in flight between the loader and the store.
const CHANNEL_CAPACITY: usize = 4;

const SCRATCH_PREFIX: &str = "fcache-";

/// Loaded content read back from its temporary file.
///
/// The file is deleted when this stream is dropped, whether or not it was
/// read to the end.
#[derive(Debug)]
pub struct ScratchFile {
    inner: ReaderStream<File>,
    path: TempPath,
}

impl ScratchFile {
    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Stream for ScratchFile {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Feed `source` to `sink` while copying it to a scratch file, then return
/// the copy.
///
/// A failure reading `source` or writing the file is also delivered to the
/// sink's stream so the store never commits a truncated object.
pub(crate) async fn tee<F, Fut>(source: ByteStream, sink: F) -> CacheResult<ScratchFile>
where
    F: FnOnce(ByteStream) -> Fut,
    Fut: Future<Output = CacheResult<()>>,
{
    let (file, path) = create().await?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let (stored, copied) = tokio::join!(sink(Box::pin(rx)), copy(source, file, tx));

    // A loader or scratch failure is the root cause of any store failure.
    let (mut file, forwarded_all) = copied?;
    stored?;
    if !forwarded_all {
        return Err(CacheError::backend(
            "store finished before consuming the loaded content",
        ));
    }

    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|e| CacheError::with_source(ErrorKind::Scratch, "rewind scratch file", e))?;

    debug!(path = %path.display(), "Scratch file ready");

    Ok(ScratchFile {
        inner: ReaderStream::new(file),
        path,
    })
}

async fn create() -> CacheResult<(File, TempPath)> {
    let named = tokio::task::spawn_blocking(|| {
        tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempfile()
    })
    .await
    .map_err(|e| CacheError::with_source(ErrorKind::Scratch, "scratch file task failed", e))?
    .map_err(|e| CacheError::with_source(ErrorKind::Scratch, "create scratch file", e))?;

    let (file, path) = named.into_parts();
    Ok((File::from_std(file), path))
}

/// Returns the flushed file and whether every chunk reached the sink.
async fn copy(
    mut source: ByteStream,
    mut file: File,
    mut tx: mpsc::Sender<io::Result<Bytes>>,
) -> CacheResult<(File, bool)> {
    let mut forwarding = true;

    while let Some(chunk) = source.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(io::Error::new(err.kind(), err.to_string()))).await;
                return Err(CacheError::with_source(
                    ErrorKind::Loader,
                    "read loaded content",
                    err,
                ));
            }
        };

        if let Err(err) = file.write_all(&chunk).await {
            let _ = tx.send(Err(io::Error::new(err.kind(), err.to_string()))).await;
            return Err(CacheError::with_source(
                ErrorKind::Scratch,
                "write scratch file",
                err,
            ));
        }

        if forwarding && tx.send(Ok(chunk)).await.is_err() {
            forwarding = false;
        }
    }
    drop(tx);

    file.flush()
        .await
        .map_err(|e| CacheError::with_source(ErrorKind::Scratch, "flush scratch file", e))?;

    Ok((file, forwarding))
}
