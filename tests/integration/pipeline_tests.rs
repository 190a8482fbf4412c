//! End-to-end load pipeline tests: routing, failover, cancellation,
//! classification.

use std::sync::Arc;

use bytes::Bytes;

use hips_streamer::{
    abort, FetchError, LoadError, Loader, PayloadKind, SurveyContext, TileArena, TileExt,
    TileStatus,
};

use super::test_utils::{color_jpeg, fits_i16, gray_jpeg, test_survey, MockFetcher};

#[tokio::test]
async fn test_connection_refused_then_mirror_recovers() {
    // Request (order=3, pix=17) with caching disabled: the load path is the
    // network; "connection refused" on the primary followed by a successful
    // mirror ends Ready with net_loads == 1.
    let ctx = test_survey(TileExt::Jpg, None, true);
    let fetcher = Arc::new(
        MockFetcher::new()
            .with(
                "primary.example.org",
                Err(FetchError::Connection("connection refused".to_string())),
            )
            .with("mirror.example.org", Ok(Bytes::from(gray_jpeg(64)))),
    );
    let loader = Loader::new(ctx.clone(), fetcher.clone());

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 17);
    loader.load_now(&tile).await.unwrap();

    assert_eq!(tile.status().get(), TileStatus::Ready);
    assert_eq!(fetcher.calls(), 2);

    let snap = ctx.counters().snapshot();
    assert_eq!(snap.net_loads, 1);
    assert_eq!(snap.cache_loads, 0);
}

#[tokio::test]
async fn test_gray_survey_classified_from_first_tile() {
    let ctx = test_survey(TileExt::Jpg, None, false);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(gray_jpeg(32)))),
    );
    let loader = Loader::new(ctx.clone(), fetcher);

    let arena = TileArena::new("it-survey");
    assert!(ctx.payload_kind().is_none());

    loader.load_now(&arena.get_or_create(3, 0)).await.unwrap();
    assert_eq!(ctx.payload_kind(), Some(PayloadKind::CompressedGray));
}

#[tokio::test]
async fn test_color_survey_classified_from_first_tile() {
    let ctx = test_survey(TileExt::Jpg, None, false);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(color_jpeg(32)))),
    );
    let loader = Loader::new(ctx.clone(), fetcher);

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 0);
    loader.load_now(&tile).await.unwrap();

    assert_eq!(ctx.payload_kind(), Some(PayloadKind::CompressedColor));
    assert!(tile.with_buffer(|b| b.is_color()).unwrap());
}

#[tokio::test]
async fn test_fits_survey_rescales_against_cut_range() {
    // Survey cut range is [0, 1000]; a sample of 500 must land mid-scale.
    let payload = fits_i16(2, 1, &[500, 1000], None);
    let ctx = test_survey(TileExt::Fits, None, false);
    let fetcher =
        Arc::new(MockFetcher::new().with("primary.example.org", Ok(Bytes::from(payload))));
    let loader = Loader::new(ctx.clone(), fetcher);

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 0);
    loader.load_now(&tile).await.unwrap();

    assert_eq!(ctx.payload_kind(), Some(PayloadKind::RawNumeric));
    let mid = tile.display_at(0, 0).unwrap();
    assert!((127..=128).contains(&mid));
    assert_eq!(tile.display_at(1, 0), Some(255));
}

#[tokio::test]
async fn test_not_found_is_sticky_error() {
    let ctx = test_survey(TileExt::Jpg, None, true);
    let fetcher = Arc::new(MockFetcher::new().with(
        "primary.example.org",
        Err(FetchError::NotFound("missing".to_string())),
    ));
    let loader = Loader::new(ctx, fetcher.clone());

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 17);
    let result = loader.load_now(&tile).await;

    assert!(matches!(
        result,
        Err(LoadError::Fetch(FetchError::NotFound(_)))
    ));
    // Not-found never consults the mirror.
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(tile.status().get(), TileStatus::Error);

    // Sticky: siblings are unaffected, the tile stays Error until
    // explicitly re-requested.
    assert_eq!(tile.status().get(), TileStatus::Error);
    let sibling = arena.get_or_create(3, 18);
    assert_eq!(sibling.status().get(), TileStatus::Unloaded);
}

#[tokio::test]
async fn test_abort_is_not_an_error_outcome() {
    use async_trait::async_trait;
    use hips_streamer::{CancelProbe, TileFetcher};
    use url::Url;

    struct StalledFetcher;

    #[async_trait]
    impl TileFetcher for StalledFetcher {
        async fn fetch(
            &self,
            _url: &Url,
            _chunk: usize,
            cancel: &dyn CancelProbe,
        ) -> Result<Bytes, FetchError> {
            while !cancel.cancelled() {
                tokio::task::yield_now().await;
            }
            Err(FetchError::Cancelled)
        }
    }

    let ctx = test_survey(TileExt::Jpg, None, false);
    let loader = Loader::new(ctx, Arc::new(StalledFetcher));

    let arena = TileArena::new("it-survey");
    let tile = arena.get_or_create(3, 17);

    let tile2 = tile.clone();
    let aborter = tokio::spawn(async move {
        loop {
            if tile2.status().get().is_in_flight() {
                assert!(abort(&tile2));
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    let result = loader.load_now(&tile).await;
    aborter.await.unwrap();

    assert!(matches!(result, Err(LoadError::Cancelled)));
    assert_eq!(tile.status().get(), TileStatus::Unloaded);
    assert!(!tile.has_buffer());

    // Re-requestable afterwards.
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(gray_jpeg(8)))),
    );
    let loader = Loader::new(test_survey(TileExt::Jpg, None, false), fetcher);
    loader.load_now(&tile).await.unwrap();
    assert_eq!(tile.status().get(), TileStatus::Ready);
}

#[tokio::test]
async fn test_failures_are_tile_local() {
    let ctx = test_survey(TileExt::Jpg, None, false);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(gray_jpeg(8)))),
    );
    let bad_fetcher = Arc::new(MockFetcher::new().with(
        "primary.example.org",
        Err(FetchError::Connection("down".to_string())),
    ));

    let arena = TileArena::new("it-survey");
    let bad_tile = arena.get_or_create(3, 1);
    let good_tile = arena.get_or_create(3, 2);

    let bad_loader = Loader::new(ctx.clone(), bad_fetcher);
    assert!(bad_loader.load_now(&bad_tile).await.is_err());

    // The sibling loads fine through a healthy path.
    let good_loader = Loader::new(ctx, fetcher);
    good_loader.load_now(&good_tile).await.unwrap();
    assert_eq!(bad_tile.status().get(), TileStatus::Error);
    assert_eq!(good_tile.status().get(), TileStatus::Ready);
}
