//! Quadtree derivation tests across the arena: NESTED children, ancestor
//! crops, transitive depth, and derivation after partial reclamation.

use std::sync::Arc;

use bytes::Bytes;

use hips_streamer::{
    EvictionSweep, Liveness, Loader, SweepConfig, TileArena, TileExt, TileStatus,
};

use super::test_utils::{gray_jpeg, test_survey, MockFetcher};

/// Load a real JPEG tile into (order, pixel) so children can derive from it.
async fn load_root(arena: &TileArena, order: u8, pixel: u64, side: u32) -> Arc<hips_streamer::Tile> {
    let ctx = test_survey(TileExt::Jpg, None, false);
    let fetcher = Arc::new(
        MockFetcher::new().with("primary.example.org", Ok(Bytes::from(gray_jpeg(side)))),
    );
    let loader = Loader::new(ctx, fetcher);
    let tile = arena.get_or_create(order, pixel);
    loader.load_now(&tile).await.unwrap();
    tile
}

#[tokio::test]
async fn test_children_ready_immediately_with_quadrant_identity() {
    // Parent (order=4, pix=1) is READY; its children (order=5, pix=4..=7)
    // are READY immediately with depth 1, and child 2's (0,0) equals the
    // parent's (0, w) where w is half the parent's width.
    let arena = TileArena::new("it-survey");
    let parent = load_root(&arena, 4, 1, 64).await;

    let children = arena.children(&parent);
    for (i, child) in children.iter().enumerate() {
        assert_eq!(child.status().get(), TileStatus::Ready);
        assert_eq!(child.depth(), 1);
        assert_eq!(child.key().order, 5);
        assert_eq!(child.key().pixel, 4 + i as u64);
    }

    let w = parent.with_buffer(|b| b.width()).unwrap() / 2;
    assert_eq!(children[2].display_at(0, 0), parent.display_at(0, w));
    assert_eq!(children[1].display_at(0, 0), parent.display_at(w, 0));
    assert_eq!(children[3].display_at(0, 0), parent.display_at(w, w));
    assert_eq!(children[0].display_at(0, 0), parent.display_at(0, 0));
}

#[tokio::test]
async fn test_transitive_derivation_depth_two_and_three() {
    let arena = TileArena::new("it-survey");
    let root = load_root(&arena, 3, 2, 64).await;

    let children = arena.children(&root);
    let grandchildren = arena.children(&children[1]);
    let great = arena.children(&grandchildren[2]);

    assert_eq!(grandchildren[2].depth(), 2);
    assert_eq!(great[0].depth(), 3);

    // Each depth-k tile's crop equals cropping the root at its accumulated
    // window: verify via the pixel identity the other direction - a
    // grandchild's pixels equal the corresponding region of its parent.
    let gc = &grandchildren[2];
    let parent_w = children[1].with_buffer(|b| b.width()).unwrap() / 2;
    for (x, y) in [(0, 0), (1, 0), (3, 5), (7, 7)] {
        assert_eq!(
            gc.display_at(x, y),
            children[1].display_at(x, y + parent_w),
            "grandchild crop mismatch at ({x},{y})"
        );
    }

    // Depth 3 still derives from the single self-owned root.
    assert!(Arc::ptr_eq(&great[0].ancestor().unwrap(), &root));
    assert!(great[0].display_at(0, 0).is_some());
}

#[tokio::test]
async fn test_derived_crops_survive_root_eviction() {
    let arena = Arc::new(TileArena::new("it-survey"));
    let root = load_root(&arena, 4, 1, 32).await;
    let children = arena.children(&root);

    // Materialize one child, then evict the root.
    let before = children[0].display_at(3, 3);
    assert!(before.is_some());

    let ctx = test_survey(TileExt::Jpg, None, false);
    let sweep = EvictionSweep::new(arena.clone(), ctx, SweepConfig::default());
    sweep.free(&root).await;
    assert!(!root.has_buffer());

    // The already-materialized crop keeps serving pixels; an unmaterialized
    // sibling can no longer derive.
    assert_eq!(children[0].display_at(3, 3), before);
    assert!(children[1].display_at(0, 0).is_none());
}

#[tokio::test]
async fn test_sweep_classification_age_ordering() {
    let arena = Arc::new(TileArena::new("it-survey"));
    let tile = load_root(&arena, 5, 4, 16).await;
    let ctx = test_survey(TileExt::Jpg, None, false);
    let config = SweepConfig {
        live_window: std::time::Duration::from_millis(100),
        grace: std::time::Duration::from_millis(100),
        ..SweepConfig::default()
    };
    let sweep = EvictionSweep::new(arena, ctx, config);

    tile.touch(0);
    assert_eq!(sweep.classify(&tile, 50), Liveness::Alive);
    assert_eq!(sweep.classify(&tile, 150), Liveness::Aging);
    assert_eq!(sweep.classify(&tile, 250), Liveness::Dead);

    // Touching resets to ALIVE.
    tile.touch(250);
    assert_eq!(sweep.classify(&tile, 250), Liveness::Alive);
}
