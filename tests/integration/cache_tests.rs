//! Cache round-trip tests: write-back on eviction, reload from disk,
//! corrupt-entry fallback.

use std::sync::Arc;

use bytes::Bytes;

use hips_streamer::{
    CacheStore, EvictionSweep, FetchError, Loader, NeverCancel, SurveyContext, SweepConfig,
    TileArena, TileExt, TileKey, TileStatus,
};

use super::test_utils::{gray_jpeg, test_survey, MockFetcher, ScratchRoot};

#[tokio::test]
async fn test_evict_writes_back_then_reload_hits_cache() {
    let root = ScratchRoot::new("writeback");
    let ctx = test_survey(TileExt::Jpg, Some(root.0.clone()), false);
    let payload = gray_jpeg(32);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(payload.clone()))),
    );

    let arena = Arc::new(TileArena::new("it-survey"));
    let loader = Loader::new(ctx.clone(), fetcher.clone());
    let tile = arena.get_or_create(4, 33);
    loader.load_now(&tile).await.unwrap();
    let pixels_before = tile.with_buffer(|b| b.display_plane()).unwrap();

    // Evict: the retained compressed stream is written back verbatim.
    let sweep = EvictionSweep::new(arena.clone(), ctx.clone(), SweepConfig::default());
    sweep.free(&tile).await;
    assert_eq!(tile.status().get(), TileStatus::Unloaded);
    assert!(!tile.has_buffer());

    let store = CacheStore::new(&root.0);
    let key = TileKey::new("it-survey", 4, 33);
    let on_disk = store
        .read(&key, TileExt::Jpg, 4096, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(&on_disk[..], &payload[..]);

    // Reload: served from the cache, not the network.
    let calls_before = fetcher.calls();
    loader.load_now(&tile).await.unwrap();
    assert_eq!(tile.status().get(), TileStatus::Ready);
    assert_eq!(fetcher.calls(), calls_before);

    let snap = ctx.counters().snapshot();
    assert_eq!(snap.net_loads, 1);
    assert_eq!(snap.cache_loads, 1);
    assert!(snap.bytes_written > 0);

    // Identical pixels both ways.
    let pixels_after = tile.with_buffer(|b| b.display_plane()).unwrap();
    assert_eq!(pixels_before, pixels_after);
}

#[tokio::test]
async fn test_corrupt_cache_entry_falls_back_to_net() {
    let root = ScratchRoot::new("corrupt");
    let ctx = test_survey(TileExt::Jpg, Some(root.0.clone()), false);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(gray_jpeg(16)))),
    );

    // Seed a garbage cache file at the tile's path.
    let store = CacheStore::new(&root.0);
    let key = TileKey::new("it-survey", 3, 17);
    store
        .write(&key, TileExt::Jpg, b"definitely not a jpeg")
        .await
        .unwrap();

    let arena = TileArena::new("it-survey");
    let loader = Loader::new(ctx.clone(), fetcher.clone());
    let tile = arena.get_or_create(3, 17);
    loader.load_now(&tile).await.unwrap();

    // The pipeline consumed the corrupt entry, deleted it, and refetched.
    assert_eq!(tile.status().get(), TileStatus::Ready);
    assert_eq!(fetcher.calls(), 1);
    assert!(!store.contains(&key, TileExt::Jpg).await);

    let snap = ctx.counters().snapshot();
    assert_eq!(snap.net_loads, 1);
    assert_eq!(snap.cache_loads, 0);
}

#[tokio::test]
async fn test_fits_write_back_round_trips_pixels() {
    // A raw-numeric tile has no retained stream; eviction synthesizes an
    // 8-bit FITS cache file that must decode back to identical pixels.
    let root = ScratchRoot::new("fits-roundtrip");
    let ctx = test_survey(TileExt::Fits, Some(root.0.clone()), false);

    let values: Vec<i16> = (0..64).map(|i| (i * 15) as i16).collect();
    let payload = super::test_utils::fits_i16(8, 8, &values, None);
    let fetcher =
        Arc::new(MockFetcher::new().with("primary.example.org", Ok(Bytes::from(payload))));

    let arena = Arc::new(TileArena::new("it-survey"));
    let loader = Loader::new(ctx.clone(), fetcher);
    let tile = arena.get_or_create(4, 7);
    loader.load_now(&tile).await.unwrap();
    let display_before = tile.with_buffer(|b| b.display_plane()).unwrap();

    let sweep = EvictionSweep::new(arena, ctx, SweepConfig::default());
    sweep.free(&tile).await;

    // Reload straight from the synthesized cache file.
    let ctx2 = test_survey(TileExt::Fits, Some(root.0.clone()), false);
    let no_net = Arc::new(MockFetcher::new());
    let loader2 = Loader::new(ctx2.clone(), no_net.clone());
    loader2.load_now(&tile).await.unwrap();

    let display_after = tile.with_buffer(|b| b.display_plane()).unwrap();
    assert_eq!(display_before, display_after);
    assert_eq!(no_net.calls(), 0);
    assert_eq!(ctx2.counters().snapshot().cache_loads, 1);
}

#[tokio::test]
async fn test_net_failure_with_warm_cache_still_loads() {
    // Cache-first means a dead network does not matter once the tile is on
    // disk.
    let root = ScratchRoot::new("warm");
    let store = CacheStore::new(&root.0);
    let key = TileKey::new("it-survey", 3, 9);
    store
        .write(&key, TileExt::Jpg, &gray_jpeg(16))
        .await
        .unwrap();

    let ctx = test_survey(TileExt::Jpg, Some(root.0.clone()), false);
    let fetcher = Arc::new(MockFetcher::new().with(
        "primary.example.org",
        Err(FetchError::Connection("network down".to_string())),
    ));
    let loader = Loader::new(ctx, fetcher.clone());

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 9);
    loader.load_now(&tile).await.unwrap();

    assert_eq!(tile.status().get(), TileStatus::Ready);
    assert_eq!(fetcher.calls(), 0);
}
