//! S3-compatible object storage store.
//!
//! Keys are namespaced as `prefix!!key` when a prefix is configured. The
//! logical file name travels in the reserved user metadata entry
//! [`FILENAME_META_KEY`], next to the caller's own metadata.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, MetadataDirective};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use fcache_core::config::storage::S3StoreConfig;
use fcache_core::error::{CacheError, ErrorKind};
use fcache_core::result::CacheResult;
use fcache_core::traits::store::{ByteStream, GetUrlParams, Store};
use fcache_core::types::{FileMeta, StoreStats};

/// Reserved user metadata key carrying the percent-encoded logical file name.
pub const FILENAME_META_KEY: &str = "fcache-filename";

/// Separator between the configured prefix and the caller's key.
pub const PREFIX_SEPARATOR: &str = "!!";

/// Content is uploaded in parts of this size; smaller payloads go in a
/// single PutObject.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Concurrent HEAD requests issued while listing.
const LIST_CONCURRENCY: usize = 8;

/// Maps caller keys to object keys and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Create a codec for the given prefix; an empty prefix is the identity.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Object key for a caller key.
    pub fn encode(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        format!("{}{PREFIX_SEPARATOR}{key}", self.prefix)
    }

    /// Caller key for a listed object key.
    ///
    /// Keys where the separator does not occur exactly once were not written
    /// through this codec and are returned unmodified.
    pub fn decode(&self, object_key: &str) -> String {
        if self.prefix.is_empty() {
            return object_key.to_string();
        }
        let mut parts = object_key.split(PREFIX_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(key), None) => key.to_string(),
            _ => object_key.to_string(),
        }
    }

    /// Listing prefix covering every key of this codec.
    pub fn list_prefix(&self) -> Option<String> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(format!("{}{PREFIX_SEPARATOR}", self.prefix))
        }
    }
}

/// S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    keys: KeyCodec,
}

impl S3Store {
    /// Create a store over an existing client.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            keys: KeyCodec::new(prefix),
        }
    }

    /// Build the client from configuration and create the store.
    pub async fn from_config(config: &S3StoreConfig) -> CacheResult<Self> {
        if config.bucket.is_empty() {
            return Err(CacheError::configuration("S3 bucket must not be empty"));
        }

        info!(
            endpoint = %config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            prefix = %config.prefix,
            "Initializing S3 store"
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if !config.endpoint.is_empty() {
            loader = loader.endpoint_url(&config.endpoint);
        }
        if !config.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "fcache-config",
            ));
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self::new(
            Client::from_conf(s3_config),
            &config.bucket,
            &config.prefix,
        ))
    }

    async fn head(&self, key: &str) -> CacheResult<FileMeta> {
        self.head_object(&self.keys.encode(key), key.to_string())
            .await
    }

    /// HEAD a stored object by its object key; `key` is reported back as the
    /// caller key.
    async fn head_object(&self, object_key: &str, key: String) -> CacheResult<FileMeta> {
        let out = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| lookup_error(e, "head object", &key))?;

        let (name, meta) = decode_metadata(out.metadata());
        Ok(FileMeta {
            name,
            mime: out.content_type().unwrap_or_default().to_string(),
            size: out.content_length().unwrap_or_default().max(0) as u64,
            meta,
            key,
            created_at: out.last_modified().and_then(to_chrono),
        })
    }

    async fn list_objects(&self) -> CacheResult<Vec<(String, u64)>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(self.keys.list_prefix())
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| sdk_error(e, "list objects", &self.bucket))?;
            for obj in page.contents() {
                if let Some(object_key) = obj.key() {
                    let size = obj.size().unwrap_or_default().max(0) as u64;
                    objects.push((object_key.to_string(), size));
                }
            }
        }
        Ok(objects)
    }

    async fn put_single(
        &self,
        object_key: &str,
        meta: &FileMeta,
        body: Bytes,
    ) -> CacheResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .set_content_type(content_type(meta))
            .set_metadata(Some(encode_metadata(meta)))
            .body(S3ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error(e, "put object", object_key))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        object_key: &str,
        meta: &FileMeta,
        first: Bytes,
        rest: ByteStream,
    ) -> CacheResult<()> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(object_key)
            .set_content_type(content_type(meta))
            .set_metadata(Some(encode_metadata(meta)))
            .send()
            .await
            .map_err(|e| sdk_error(e, "create multipart upload", object_key))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| {
                CacheError::backend(format!("create multipart upload {object_key:?}: no upload id"))
            })?
            .to_string();

        match self.upload_parts(object_key, &upload_id, first, rest).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(object_key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| sdk_error(e, "complete multipart upload", object_key))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(object_key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = object_key,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        object_key: &str,
        upload_id: &str,
        first: Bytes,
        mut rest: ByteStream,
    ) -> CacheResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part = first;
        let mut exhausted = false;
        for part_number in 1.. {
            parts.push(
                self.upload_part(object_key, upload_id, part_number, part)
                    .await?,
            );
            if exhausted {
                break;
            }
            let (next, done) = read_part(&mut rest, object_key).await?;
            if next.is_empty() {
                break;
            }
            part = next;
            exhausted = done;
        }
        debug!(key = object_key, parts = parts.len(), "Uploaded multipart object");
        Ok(parts)
    }

    async fn upload_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> CacheResult<CompletedPart> {
        let out = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(object_key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(S3ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error(e, "upload part", object_key))?;
        Ok(CompletedPart::builder()
            .set_e_tag(out.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }
}

#[async_trait]
impl Store for S3Store {
    fn store_type(&self) -> &str {
        "s3"
    }

    async fn meta(&self, key: &str) -> CacheResult<FileMeta> {
        self.head(key).await
    }

    async fn get(&self, key: &str) -> CacheResult<ByteStream> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.keys.encode(key))
            .send()
            .await
            .map_err(|e| lookup_error(e, "get object", key))?;
        Ok(Box::pin(ReaderStream::new(out.body.into_async_read())))
    }

    async fn get_url(&self, key: &str, params: &GetUrlParams) -> CacheResult<String> {
        let meta = self.head(key).await?;
        let filename = match params.filename.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => meta.name.as_str(),
        };

        let presigning = PresigningConfig::expires_in(params.expires).map_err(|e| {
            CacheError::with_source(
                ErrorKind::InvalidRequest,
                format!("presign {key:?}: invalid expiry {:?}", params.expires),
                e,
            )
        })?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.keys.encode(key))
            .response_content_disposition(content_disposition(filename))
            .presigned(presigning)
            .await
            .map_err(|e| sdk_error(e, "presign get object", key))?;
        Ok(request.uri().to_string())
    }

    async fn put(&self, key: &str, meta: &FileMeta, mut content: ByteStream) -> CacheResult<()> {
        let object_key = self.keys.encode(key);
        let (first, done) = read_part(&mut content, key).await?;
        if done {
            self.put_single(&object_key, meta, first).await?;
        } else {
            self.put_multipart(&object_key, meta, first, content).await?;
        }
        debug!(key, bucket = %self.bucket, "Stored object");
        Ok(())
    }

    async fn update_meta(&self, key: &str, meta: &FileMeta) -> CacheResult<()> {
        let object_key = self.keys.encode(key);
        let copy_source = format!("{}/{}", self.bucket, urlencoding::encode(&object_key));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .copy_source(copy_source)
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(content_type(meta))
            .set_metadata(Some(encode_metadata(meta)))
            .send()
            .await
            .map_err(|e| lookup_error(e, "update metadata", key))?;
        Ok(())
    }

    /// S3 deletes are idempotent, so removing an absent key succeeds.
    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.keys.encode(key))
            .send()
            .await
            .map_err(|e| lookup_error(e, "remove object", key))?;
        Ok(())
    }

    async fn stat(&self) -> CacheResult<StoreStats> {
        let objects = self.list_objects().await?;
        Ok(StoreStats {
            keys: objects.len() as u64,
            size: objects.iter().map(|(_, size)| size).sum(),
        })
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let objects = self.list_objects().await?;
        Ok(objects
            .into_iter()
            .map(|(object_key, _)| self.keys.decode(&object_key))
            .collect())
    }

    /// ListObjectsV2 does not return user metadata, so every listed object is
    /// followed by a HEAD request on its object key.
    async fn list(&self) -> CacheResult<Vec<FileMeta>> {
        let objects = self.list_objects().await?;
        let metas: Vec<Option<FileMeta>> = stream::iter(objects)
            .map(|(object_key, _)| async move {
                let key = self.keys.decode(&object_key);
                match self.head_object(&object_key, key).await {
                    Ok(meta) => Ok(Some(meta)),
                    // removed between listing and HEAD
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .buffered(LIST_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(metas.into_iter().flatten().collect())
    }
}

/// Caller metadata plus the reserved filename entry.
///
/// S3 metadata values must be ASCII, so the name is percent-encoded.
fn encode_metadata(meta: &FileMeta) -> HashMap<String, String> {
    let mut out = meta.meta.clone();
    out.insert(
        FILENAME_META_KEY.to_string(),
        urlencoding::encode(&meta.name).into_owned(),
    );
    out
}

/// Split stored metadata into the logical file name and the caller's entries.
fn decode_metadata(raw: Option<&HashMap<String, String>>) -> (String, HashMap<String, String>) {
    let mut meta = raw.cloned().unwrap_or_default();
    let name = meta
        .remove(FILENAME_META_KEY)
        .map(|encoded| match urlencoding::decode(&encoded) {
            Ok(name) => name.into_owned(),
            Err(_) => encoded,
        })
        .unwrap_or_default();
    (name, meta)
}

fn content_type(meta: &FileMeta) -> Option<String> {
    (!meta.mime.is_empty()).then(|| meta.mime.clone())
}

/// `Content-Disposition` value for a presigned download.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    if fallback == filename {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

/// Read up to one part from the stream. Returns the bytes and whether the
/// stream is exhausted.
async fn read_part(content: &mut ByteStream, key: &str) -> CacheResult<(Bytes, bool)> {
    let mut buf = BytesMut::new();
    while buf.len() < PART_SIZE {
        match content.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(e)) => {
                return Err(CacheError::with_source(
                    ErrorKind::Backend,
                    format!("read content for {key:?}"),
                    e,
                ));
            }
            None => return Ok((buf.freeze(), true)),
        }
    }
    Ok((buf.freeze(), false))
}

fn to_chrono(at: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(at.secs(), at.subsec_nanos())
}

/// Failure of a request against an existing object. A missing object is
/// NotFound; a missing bucket or any other failure is a store error.
fn lookup_error<E>(err: SdkError<E, HttpResponse>, op: &str, key: &str) -> CacheError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let not_found = match err.as_service_error().and_then(|e| e.code()) {
        Some(code) => matches!(code, "NoSuchKey" | "NotFound"),
        // HEAD responses carry no error body
        None => status == Some(404),
    };

    if not_found {
        return CacheError::not_found(format!("{op} {key:?}: not found"));
    }
    sdk_error(err, op, key)
}

fn sdk_error<E>(err: SdkError<E, HttpResponse>, op: &str, key: &str) -> CacheError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    CacheError::with_source(
        ErrorKind::Backend,
        format!("{op} {key:?}: {}", DisplayErrorContext(&err)),
        err,
    )
}
