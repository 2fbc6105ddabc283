//! Integration tests for the read-through/write-through paths over the
//! local store.

mod helpers;

use std::time::Duration;

use fcache_cache::{CacheOptions, GetRequest};
use fcache_core::error::ErrorKind;
use fcache_core::traits::store::{GetUrlParams, Store};
use fcache_core::types::meta::{FileMeta, INVALIDATE_AT_KEY, format_timestamp};

use helpers::{TestCache, broken_loader, read_all, text_loader, unreachable_loader};

const TTL: Duration = Duration::from_secs(30 * 60);

#[tokio::test]
async fn test_get_file_miss_then_hit() {
    let app = TestCache::new(CacheOptions::default()).await;

    let (content, meta) = app
        .cache
        .get_file(GetRequest::new("k", TTL, text_loader("a.txt", "hello")))
        .await
        .unwrap();
    assert_eq!(read_all(content).await.as_ref(), b"hello");
    assert_eq!(meta.name, "a.txt");
    assert_eq!(meta.mime, "text/plain");
    assert_eq!(meta.size, 5);

    let (content, meta) = app
        .cache
        .get_file(GetRequest::new("k", TTL, unreachable_loader()))
        .await
        .unwrap();
    assert_eq!(read_all(content).await.as_ref(), b"hello");
    assert_eq!(meta.name, "a.txt");
    assert_eq!(meta.size, 5);

    let stats = app.cache.stat().await.unwrap();
    assert_eq!((stats.hits, stats.misses, stats.errors), (1, 1, 0));
    assert_eq!(stats.store.keys, 1);
    assert_eq!(stats.store.size, 5);
}

#[tokio::test]
async fn test_metadata_survives_store_round_trip() {
    let app = TestCache::new(CacheOptions::default()).await;
    let loader = fcache_cache::Loader::from_bytes(
        "{}",
        FileMeta::new("doc.json", "application/json", 2)
            .with_meta("owner", "alice")
            .with_meta("source", "upstream"),
    );

    app.cache
        .get_file(GetRequest::new("doc", TTL, loader))
        .await
        .unwrap();

    let stored = app.store.meta("doc").await.unwrap();
    assert_eq!(stored.meta.get("owner").map(String::as_str), Some("alice"));
    assert_eq!(stored.meta.get("source").map(String::as_str), Some("upstream"));
    assert_eq!(
        stored.meta.get(INVALIDATE_AT_KEY),
        Some(&format_timestamp(
            TestCache::epoch() + chrono::Duration::minutes(30)
        ))
    );
    assert_eq!(stored.meta.len(), 3);

    let listed = app.store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].meta, stored.meta);
}

#[tokio::test]
async fn test_scratch_copy_is_independent_of_store() {
    let app = TestCache::new(CacheOptions::default()).await;

    let (content, _) = app
        .cache
        .get_file(GetRequest::new("k", TTL, text_loader("a.txt", "hello")))
        .await
        .unwrap();

    // The returned stream reads its own copy.
    app.store.remove("k").await.unwrap();
    assert_eq!(read_all(content).await.as_ref(), b"hello");
}

#[tokio::test]
async fn test_get_url_writes_once() {
    let app = TestCache::new(CacheOptions::default()).await;
    let params = GetUrlParams {
        filename: None,
        expires: Duration::from_secs(60),
    };

    let (url, meta) = app
        .cache
        .get_url(GetRequest::new("k", TTL, text_loader("a.txt", "hello")), &params)
        .await
        .unwrap();
    assert!(url.starts_with("file://"));
    assert_eq!(meta.name, "a.txt");

    let before = app.store.meta("k").await.unwrap();
    let (again, _) = app
        .cache
        .get_url(GetRequest::new("k", TTL, unreachable_loader()), &params)
        .await
        .unwrap();
    assert_eq!(again, url);
    assert_eq!(app.store.meta("k").await.unwrap(), before);
}

#[tokio::test]
async fn test_extend_ttl_persists_new_deadline() {
    let app = TestCache::new(CacheOptions::default().with_extend_ttl(true)).await;

    app.cache
        .get_file(GetRequest::new("k", TTL, text_loader("a.txt", "hello")))
        .await
        .unwrap();
    app.cache
        .get_file(GetRequest::new("k", TTL, unreachable_loader()))
        .await
        .unwrap();

    let stored = app.store.meta("k").await.unwrap();
    assert_eq!(
        stored.meta.get(INVALIDATE_AT_KEY),
        Some(&format_timestamp(
            TestCache::epoch() + chrono::Duration::minutes(60)
        ))
    );
}

#[tokio::test]
async fn test_loader_failure_leaves_store_empty() {
    let app = TestCache::new(CacheOptions::default()).await;
    let loader = fcache_cache::Loader::new(|_| async {
        fcache_cache::loader::LoadResult::Err("upstream unavailable".into())
    });

    let err = app
        .cache
        .get_file(GetRequest::new("k", TTL, loader))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Loader);
    assert!(app.store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_loader_stream_is_loader_error_on_both_paths() {
    let app = TestCache::new(CacheOptions::default()).await;

    let err = app
        .cache
        .get_file(GetRequest::new("k", TTL, broken_loader()))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Loader);

    let err = app
        .cache
        .get_url(
            GetRequest::new("k", TTL, broken_loader()),
            &GetUrlParams::default(),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Loader);

    assert_eq!(app.cache.counters().errors(), 0);
    assert!(app.store.keys().await.unwrap().is_empty());
}
