//! The tile load pipeline.
//!
//! [`Loader::load_now`] is the synchronous entry point used when data is
//! needed immediately; [`Loader::submit`] queues a tile for one of the
//! background workers, which pop in ascending-priority order. Both paths run
//! the same pipeline:
//!
//! 1. Claim the tile (`Unloaded`/`Error` → `Requested`). A failed claim
//!    means another task owns the attempt; duplicates are ignored.
//! 2. Probe the on-disk cache (memoized per tile) and route to
//!    `QueuedCache` or `QueuedNet`.
//! 3. Cache path: chunked read + decode. A corrupt entry is deleted and the
//!    tile falls back to the network path.
//! 4. Network path: chunked fetch from the primary site; one retry against
//!    a mirror after a connection error (never after a definitive
//!    not-found); decode.
//! 5. On success: install the buffer, retain the compressed stream for
//!    write-back when the survey caches raster tiles, bump counters, reset
//!    the age timer, CAS to `Ready`, request a repaint.
//!
//! # Cancellation
//!
//! The chunked reads poll the tile's status every chunk; an `Aborting` tile
//! raises [`LoadError::Cancelled`] there. Every unwind path funnels through
//! one cleanup routine in `load_now`: partial buffers are discarded and the
//! tile settles to `Unloaded` (cancellation is not an error, the tile may
//! be re-requested). Real failures settle to `Error` and notify the context.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{FetchError, LoadError};
use crate::format::{fits, raster, PayloadKind};
use crate::io::{chunk_size, TileFetcher};
use crate::store::CacheStore;
use crate::survey::SurveyContext;

use super::buffer::TileBuffer;
use super::clock;
use super::key::TileExt;
use super::node::Tile;
use super::state::TileStatus;

/// Default number of background load workers.
pub const DEFAULT_WORKERS: usize = 4;

// =============================================================================
// Load Queue
// =============================================================================

/// Heap entry: ascending tile priority, FIFO within a priority level.
struct QueueEntry {
    priority: i32,
    seq: u64,
    tile: Arc<Tile>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; invert so the smallest priority pops
        // first, oldest submission first within a level.
        other
            .priority
            .cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Orchestrates tile loads for one survey.
pub struct Loader<C: SurveyContext> {
    ctx: Arc<C>,
    fetcher: Arc<dyn TileFetcher>,
    store: Option<CacheStore>,

    queue: Mutex<BinaryHeap<QueueEntry>>,
    queue_wake: Notify,
    submit_seq: AtomicU64,
}

impl<C: SurveyContext> Loader<C> {
    /// Create a loader for `ctx`, fetching through `fetcher`.
    ///
    /// The on-disk cache store is derived from the context's cache root
    /// when caching is enabled.
    pub fn new(ctx: Arc<C>, fetcher: Arc<dyn TileFetcher>) -> Self {
        let store = if ctx.caching_enabled() {
            ctx.cache_root().map(CacheStore::new)
        } else {
            None
        };
        Self {
            ctx,
            fetcher,
            store,
            queue: Mutex::new(BinaryHeap::new()),
            queue_wake: Notify::new(),
            submit_seq: AtomicU64::new(0),
        }
    }

    /// The survey context this loader serves.
    pub fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    /// The cache store, when caching is enabled.
    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    // =========================================================================
    // Asynchronous loading
    // =========================================================================

    /// Queue a tile for background loading at the given priority (lower
    /// loads first). Duplicate submissions are cheap: the claim CAS fails
    /// and the worker drops the entry.
    pub fn submit(&self, tile: Arc<Tile>, priority: i32) {
        tile.set_priority(priority);
        let entry = QueueEntry {
            priority,
            seq: self.submit_seq.fetch_add(1, Ordering::Relaxed),
            tile,
        };
        self.queue.lock().push(entry);
        self.queue_wake.notify_one();
    }

    /// Spawn `n` background workers draining the submit queue.
    ///
    /// Workers run until their `JoinHandle` is aborted; a tile's failure is
    /// recorded on the tile itself and never stops a worker.
    pub fn spawn_workers(self: &Arc<Self>, n: usize) -> Vec<JoinHandle<()>> {
        (0..n)
            .map(|id| {
                let loader = Arc::clone(self);
                tokio::spawn(async move {
                    debug!(worker = id, "load worker started");
                    loop {
                        let entry = loader.queue.lock().pop();
                        match entry {
                            Some(entry) => match loader.load_now(&entry.tile).await {
                                Ok(()) => {}
                                Err(LoadError::AlreadyInFlight) => {
                                    trace!(tile = %entry.tile.key(), "duplicate submission dropped");
                                }
                                Err(e) if e.is_cancelled() => {
                                    debug!(tile = %entry.tile.key(), "load cancelled");
                                }
                                Err(e) => {
                                    warn!(tile = %entry.tile.key(), error = %e, "load failed");
                                }
                            },
                            None => loader.queue_wake.notified().await,
                        }
                    }
                })
            })
            .collect()
    }

    // =========================================================================
    // Synchronous loading
    // =========================================================================

    /// Load a tile now: cache first when it is known to be cached, network
    /// otherwise. Returns once the tile is `Ready`, `Error`, or `Unloaded`
    /// (cancelled).
    pub async fn load_now(&self, tile: &Arc<Tile>) -> Result<(), LoadError> {
        if tile.is_derived() {
            return Err(LoadError::DerivedTile {
                order: tile.key().order,
                pixel: tile.key().pixel,
            });
        }

        // Claim the attempt. Unloaded and Error are the re-enterable states.
        let status = tile.status();
        if !status.try_transition(TileStatus::Unloaded, TileStatus::Requested)
            && !status.try_transition(TileStatus::Error, TileStatus::Requested)
        {
            return Err(LoadError::AlreadyInFlight);
        }

        let result = self.run_pipeline(tile).await;

        // Single cleanup routine: every unwind path lands here.
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() || status.is_aborting() => {
                tile.clear_buffer();
                status.settle_abort();
                debug!(tile = %tile.key(), "load unwound after abort");
                Err(LoadError::Cancelled)
            }
            Err(e) => {
                tile.clear_buffer();
                if !status.try_transition(TileStatus::LoadingNet, TileStatus::Error) {
                    // Abort raced in after the failure; honor it.
                    if status.settle_abort() {
                        return Err(LoadError::Cancelled);
                    }
                }
                warn!(tile = %tile.key(), error = %e, "load failed");
                self.ctx.on_tile_error(tile);
                Err(e)
            }
        }
    }

    /// Route the claimed tile through the cache or network sub-path.
    async fn run_pipeline(&self, tile: &Arc<Tile>) -> Result<(), LoadError> {
        let status = tile.status();
        let ext = self.ctx.tile_extension();

        let store = self.store.as_ref().filter(|_| self.ctx.caching_enabled());
        let cached = match store {
            Some(store) => {
                tile.cached_already() || {
                    let present = store.contains(tile.key(), ext).await;
                    if present {
                        tile.set_cached(true);
                    }
                    present
                }
            }
            None => false,
        };

        if let (true, Some(store)) = (cached, store) {
            if !status.try_transition(TileStatus::Requested, TileStatus::QueuedCache) {
                return Err(LoadError::Cancelled);
            }
            match self.load_from_cache(tile, ext, store).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    // Corrupt cache entry: delete it and fall back to the net.
                    info!(tile = %tile.key(), error = %e, "cache entry corrupt, refetching");
                    store.remove(tile.key(), ext).await;
                    tile.set_cached(false);
                    if !status.try_transition(TileStatus::LoadingCache, TileStatus::QueuedNet) {
                        return Err(LoadError::Cancelled);
                    }
                }
            }
        } else if !status.try_transition(TileStatus::Requested, TileStatus::QueuedNet) {
            return Err(LoadError::Cancelled);
        }

        self.load_from_net(tile, ext).await
    }

    /// Cache sub-path: chunked read, decode, finish.
    async fn load_from_cache(
        &self,
        tile: &Arc<Tile>,
        ext: TileExt,
        store: &CacheStore,
    ) -> Result<(), LoadError> {
        let status = tile.status();
        if !status.try_transition(TileStatus::QueuedCache, TileStatus::LoadingCache) {
            return Err(LoadError::Cancelled);
        }

        let started = Instant::now();
        let chunk = chunk_size(self.ctx.interactive());

        let bytes = store.read(tile.key(), ext, chunk, status).await?;
        let buffer = self.decode(&bytes, ext)?;

        self.ctx
            .counters()
            .record_cache_load(bytes.len() as u64, started.elapsed().as_millis() as u64);

        self.finish(tile, buffer, None, TileStatus::LoadingCache)
    }

    /// Network sub-path: fetch with one mirror retry, decode, finish.
    async fn load_from_net(&self, tile: &Arc<Tile>, ext: TileExt) -> Result<(), LoadError> {
        let status = tile.status();
        if !status.try_transition(TileStatus::QueuedNet, TileStatus::LoadingNet) {
            return Err(LoadError::Cancelled);
        }

        let started = Instant::now();
        let chunk = chunk_size(self.ctx.interactive());
        let url = self
            .ctx
            .tile_url(tile.key())
            .ok_or_else(|| FetchError::Connection("invalid survey base URL".to_string()))?;

        let bytes = match self.fetcher.fetch(&url, chunk, status).await {
            Ok(bytes) => bytes,
            Err(FetchError::Cancelled) => return Err(LoadError::Cancelled),
            Err(e @ FetchError::NotFound(_)) => return Err(e.into()),
            Err(first @ FetchError::Connection(_)) => {
                // One retry against the alternate site, state unchanged.
                let Some(mirror) = self.ctx.pick_mirror(true) else {
                    return Err(first.into());
                };
                let mirror_url = self.mirror_url(&mirror, tile, ext)?;
                info!(tile = %tile.key(), %mirror_url, "retrying on mirror");
                match self.fetcher.fetch(&mirror_url, chunk, status).await {
                    Ok(bytes) => bytes,
                    Err(FetchError::Cancelled) => return Err(LoadError::Cancelled),
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let buffer = self.decode(&bytes, ext)?;

        self.ctx
            .counters()
            .record_net_load(bytes.len() as u64, started.elapsed().as_millis() as u64);

        // Retain the compressed stream so eviction can write it back
        // byte-for-byte. Raw-numeric tiles synthesize a cache file from the
        // display plane instead, so their stream is not kept.
        let retained = match (&self.store, ext) {
            (Some(_), TileExt::Jpg) => Some(bytes),
            _ => None,
        };

        self.finish(tile, buffer, retained, TileStatus::LoadingNet)
    }

    /// Install a decoded buffer and settle the tile to `Ready`.
    fn finish(
        &self,
        tile: &Arc<Tile>,
        buffer: TileBuffer,
        retained: Option<Bytes>,
        from: TileStatus,
    ) -> Result<(), LoadError> {
        tile.store_buffer(buffer, retained);
        let now = clock::now_ms();
        tile.mark_loaded(now);
        tile.touch(now);

        if !tile.status().try_transition(from, TileStatus::Ready) {
            // An abort won the race; the operation completes as cancelled.
            return Err(LoadError::Cancelled);
        }

        debug!(tile = %tile.key(), "tile ready");
        self.ctx.on_tile_ready(tile);
        Ok(())
    }

    /// Decode a payload according to the survey's wire format, resolving the
    /// survey-wide payload classification from the first decoded tile.
    fn decode(&self, data: &[u8], ext: TileExt) -> Result<TileBuffer, LoadError> {
        match ext {
            TileExt::Jpg => {
                let (buffer, classified) = raster::decode(data, self.ctx.payload_kind())?;
                self.ctx.resolve_payload_kind(classified);
                Ok(buffer)
            }
            TileExt::Fits => {
                let buffer = fits::decode(data, self.ctx.pixel_range())?;
                let kind = if buffer.is_color() {
                    PayloadKind::RawArgb
                } else {
                    PayloadKind::RawNumeric
                };
                self.ctx.resolve_payload_kind(kind);
                Ok(buffer)
            }
        }
    }

    fn mirror_url(&self, mirror: &Url, tile: &Tile, ext: TileExt) -> Result<Url, LoadError> {
        mirror
            .join(&tile.key().url_path(ext))
            .map_err(|e| FetchError::Connection(format!("invalid mirror URL: {e}")).into())
    }
}

/// Request cancellation of an in-flight tile.
///
/// Cooperative: the loader observes the abort at its next chunk boundary,
/// discards partial data, and settles the tile to `Unloaded`.
pub fn abort(tile: &Tile) -> bool {
    tile.status().request_abort()
}

// =============================================================================
// Tests
// =============================================================================
