//! Eviction sweep: age classification and memory reclamation.
//!
//! Tiles age by their last-touch timer. The sweep classifies every
//! instantiated tile as ALIVE, AGING, or DEAD, frees the dead ones
//! (writing not-yet-cached payloads back to the on-disk cache first) and
//! then purges fully-reclaimed subtrees out of the arena so the tiles can
//! actually drop.
//!
//! Exemptions: base-plane tiles, tiles in `Error` (kept so a known failure
//! is not refetched), and self-owned tiles mid network fetch (kept so an
//! in-flight root fetch is not aborted by mere aging) are always ALIVE.
//!
//! The sweep never frees a mid-flight tile outright: for those it only
//! requests an abort, and the loader performs the release when it unwinds.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::format::fits;
use crate::store::CacheStore;
use crate::survey::SurveyContext;

use super::arena::TileArena;
use super::clock;
use super::key::TileExt;
use super::node::Tile;
use super::state::TileStatus;

/// Age below which a tile is ALIVE.
pub const DEFAULT_LIVE_WINDOW: Duration = Duration::from_secs(30);

/// Grace period between ALIVE and DEAD.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Default period of the background sweep task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// Liveness
// =============================================================================

/// Age classification of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Recently touched; keep.
    Alive,
    /// Past the live window but within grace; keep, candidate soon.
    Aging,
    /// Past live window and grace; reclaim.
    Dead,
}

/// Sweep timing configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Age below which a tile is ALIVE.
    pub live_window: Duration,
    /// Additional age during which a tile is AGING rather than DEAD.
    pub grace: Duration,
    /// Period of the background sweep loop.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            live_window: DEFAULT_LIVE_WINDOW,
            grace: DEFAULT_GRACE,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Classify an age against the sweep windows. Monotonic in `age`:
/// ALIVE precedes AGING precedes DEAD.
pub fn classify_age(age: Duration, config: &SweepConfig) -> Liveness {
    if age <= config.live_window {
        Liveness::Alive
    } else if age <= config.live_window + config.grace {
        Liveness::Aging
    } else {
        Liveness::Dead
    }
}

/// Outcome of one [`EvictionSweep::free`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// Nothing to reclaim (no buffer, or state excluded it).
    Kept,
    /// The tile was mid-flight; an abort was requested and the loader will
    /// perform the release.
    AbortRequested,
    /// Buffer and compressed stream were dropped.
    Freed,
}

/// Counters of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Tiles whose buffers were reclaimed.
    pub freed: usize,
    /// Mid-flight tiles asked to abort.
    pub aborts: usize,
    /// Tiles written back to the cache before reclamation.
    pub written: usize,
    /// Tiles removed from the arena by the purge pass.
    pub purged: usize,
}

// =============================================================================
// Eviction Sweep
// =============================================================================

/// Periodic reclaimer of one survey's tile memory.
pub struct EvictionSweep<C: SurveyContext> {
    arena: Arc<TileArena>,
    ctx: Arc<C>,
    store: Option<CacheStore>,
    config: SweepConfig,
}

impl<C: SurveyContext> EvictionSweep<C> {
    /// Create a sweep over `arena` with the context's cache settings.
    pub fn new(arena: Arc<TileArena>, ctx: Arc<C>, config: SweepConfig) -> Self {
        let store = if ctx.caching_enabled() {
            ctx.cache_root().map(CacheStore::new)
        } else {
            None
        };
        Self {
            arena,
            ctx,
            store,
            config,
        }
    }

    /// The sweep timing configuration.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Classify one tile at `now` (millis).
    ///
    /// Applies the standing exemptions before the age windows: base-plane
    /// tiles, `Error` tiles, and self-owned tiles mid network fetch are
    /// always ALIVE.
    pub fn classify(&self, tile: &Tile, now_ms: u64) -> Liveness {
        if tile.is_base_plane() {
            return Liveness::Alive;
        }
        match tile.status().get() {
            TileStatus::Error => return Liveness::Alive,
            TileStatus::LoadingNet if tile.depth() == 0 => return Liveness::Alive,
            _ => {}
        }
        let age = Duration::from_millis(now_ms.saturating_sub(tile.last_touch()));
        classify_age(age, &self.config)
    }

    /// Reclaim one tile's memory.
    ///
    /// Mid-flight self-owned tiles only get an abort request; the loader
    /// releases the buffer when it unwinds. `Ready` self-owned tiles that
    /// are not yet cached are written back first. Derived tiles simply drop
    /// their materialized crop and stay `Ready`; they can re-materialize
    /// from the ancestor at any time.
    pub async fn free(&self, tile: &Arc<Tile>) -> FreeOutcome {
        let status = tile.status();

        if tile.depth() == 0 && status.get().is_in_flight() {
            status.request_abort();
            return FreeOutcome::AbortRequested;
        }

        if tile.is_derived() {
            if tile.has_buffer() {
                tile.clear_buffer();
                return FreeOutcome::Freed;
            }
            return FreeOutcome::Kept;
        }

        if !status.try_transition(TileStatus::Ready, TileStatus::Evicting) {
            return FreeOutcome::Kept;
        }

        if self.ctx.caching_enabled() && !tile.cached_already() {
            self.write_back(tile).await;
        }

        tile.clear_buffer();
        status.try_transition(TileStatus::Evicting, TileStatus::Unloaded);
        debug!(tile = %tile.key(), "tile evicted");
        FreeOutcome::Freed
    }

    /// Write a tile's payload to the cache before dropping it: the retained
    /// compressed stream byte-for-byte when present, otherwise a synthesized
    /// 8-bit raw-numeric file of the display plane.
    async fn write_back(&self, tile: &Arc<Tile>) {
        let Some(store) = &self.store else {
            return;
        };

        let result = if let Some(stream) = tile.compressed_stream() {
            store
                .write(tile.key(), self.ctx.tile_extension(), &stream)
                .await
                .map(|()| stream.len())
        } else {
            let Some(file) = tile.with_buffer(|b| {
                fits::synthesize_cache_file(
                    tile.key().order,
                    tile.key().pixel,
                    b.width(),
                    b.height(),
                    &b.display_plane(),
                )
            }) else {
                return;
            };
            store
                .write(tile.key(), TileExt::Fits, &file)
                .await
                .map(|()| file.len())
        };

        match result {
            Ok(bytes) => {
                tile.set_cached(true);
                self.ctx.counters().record_cache_write(bytes as u64);
            }
            // Reclamation proceeds regardless; memory pressure wins.
            Err(e) => warn!(tile = %tile.key(), error = %e, "cache write-back failed"),
        }
    }

    /// One full sweep pass at `now`: free every DEAD tile, then purge
    /// fully-reclaimed subtrees from the arena.
    pub async fn sweep_once(&self, now_ms: u64) -> SweepStats {
        let mut stats = SweepStats::default();

        for tile in self.arena.snapshot() {
            if self.classify(&tile, now_ms) != Liveness::Dead {
                continue;
            }
            let had_write_candidate = tile.depth() == 0
                && tile.status().get() == TileStatus::Ready
                && !tile.cached_already()
                && self.ctx.caching_enabled();
            match self.free(&tile).await {
                FreeOutcome::Freed => {
                    stats.freed += 1;
                    if had_write_candidate && tile.cached_already() {
                        stats.written += 1;
                    }
                }
                FreeOutcome::AbortRequested => stats.aborts += 1,
                FreeOutcome::Kept => {}
            }
        }

        for root in self.arena.roots() {
            stats.purged += self.purge_children(&root);
        }

        if stats != SweepStats::default() {
            info!(
                freed = stats.freed,
                aborts = stats.aborts,
                written = stats.written,
                purged = stats.purged,
                "eviction sweep"
            );
        }
        stats
    }

    /// Depth-first purge of `tile`'s descendants.
    ///
    /// A subtree is detached only when every tile in it is reclaimable
    /// (no buffer, not in flight); partially-live subtrees are left linked.
    /// The root record itself is never removed from the arena - only its
    /// descendants - so the quadtree top survives reclamation.
    ///
    /// Returns the number of tiles removed from the arena.
    pub fn purge_children(&self, tile: &Arc<Tile>) -> usize {
        let mut removed = 0;
        self.purge_rec(tile, &mut removed);
        removed
    }

    /// Returns whether `tile`'s whole subtree (itself included) is
    /// reclaimable, detaching reclaimable child arrays along the way.
    fn purge_rec(&self, tile: &Arc<Tile>, removed: &mut usize) -> bool {
        let mut slot = tile.children_slot().lock();

        let children_purgeable = match slot.as_ref() {
            Some(children) => {
                let all = children
                    .iter()
                    .map(|c| self.purge_rec(c, removed))
                    .fold(true, |acc, p| acc && p);
                if all {
                    for child in children.iter() {
                        self.arena.remove(child.key());
                        *removed += 1;
                    }
                    *slot = None;
                }
                all
            }
            None => true,
        };

        children_purgeable
            && !tile.is_base_plane()
            && !tile.status().get().is_in_flight()
            && !tile.has_buffer()
    }

    /// Run the sweep periodically until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once(clock::now_ms()).await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
