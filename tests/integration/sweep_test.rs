//! Integration tests for expiration sweeps over the local store.

mod helpers;

use std::time::Duration;

use chrono::Duration as ChronoDuration;

use fcache_cache::{CacheOptions, GetRequest};
use fcache_core::error::ErrorKind;
use fcache_core::traits::store::{Store, stream_from_bytes};
use fcache_core::types::meta::{FileMeta, INVALIDATE_AT_KEY};

use helpers::{TestCache, text_loader};

const TTL: Duration = Duration::from_secs(30 * 60);

#[tokio::test]
async fn test_sweep_removes_only_expired() {
    let app = TestCache::new(CacheOptions::default()).await;

    for (key, minutes_ago) in [("a", 45), ("b", 15), ("c", 60)] {
        app.set_clock(ChronoDuration::minutes(-minutes_ago));
        app.cache
            .get_file(GetRequest::new(key, TTL, text_loader("f.txt", "data")))
            .await
            .unwrap();
    }
    app.set_clock(ChronoDuration::zero());

    assert_eq!(app.cache.invalidate().await.unwrap(), 2);
    assert_eq!(app.store.keys().await.unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
async fn test_sweep_skips_objects_written_outside_cache() {
    let app = TestCache::new(CacheOptions::default()).await;
    app.store
        .put(
            "external",
            &FileMeta::new("x.bin", "application/octet-stream", 3),
            stream_from_bytes("xyz"),
        )
        .await
        .unwrap();
    app.set_clock(ChronoDuration::days(30));

    assert_eq!(app.cache.invalidate().await.unwrap(), 0);
    assert_eq!(app.store.keys().await.unwrap(), vec!["external".to_string()]);
}

#[tokio::test]
async fn test_sweep_reports_bad_timestamps() {
    let app = TestCache::new(CacheOptions::default()).await;
    app.store
        .put(
            "bad",
            &FileMeta::new("x.bin", "", 3).with_meta(INVALIDATE_AT_KEY, "not a time"),
            stream_from_bytes("xyz"),
        )
        .await
        .unwrap();
    app.set_clock(ChronoDuration::hours(-1));
    app.cache
        .get_file(GetRequest::new("old", TTL, text_loader("f.txt", "data")))
        .await
        .unwrap();
    app.set_clock(ChronoDuration::zero());

    let err = app.cache.invalidate().await.unwrap_err();
    assert_eq!(err.removed, 1);
    assert_eq!(err.errors.len(), 1);
    assert_eq!(err.errors[0].kind, ErrorKind::InvalidMetadata);
    assert_eq!(app.store.keys().await.unwrap(), vec!["bad".to_string()]);
}

#[tokio::test]
async fn test_background_sweep_stops_on_shutdown() {
    let app = TestCache::new(
        CacheOptions::default().with_invalidation_period(Duration::from_millis(20)),
    )
    .await;
    app.set_clock(ChronoDuration::hours(-1));
    app.cache
        .get_file(GetRequest::new("old", TTL, text_loader("f.txt", "data")))
        .await
        .unwrap();
    app.set_clock(ChronoDuration::zero());

    let handle = app.cache.spawn_invalidation();
    for _ in 0..100 {
        if app.store.keys().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(app.store.keys().await.unwrap().is_empty());

    app.cache.shutdown();
    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}
