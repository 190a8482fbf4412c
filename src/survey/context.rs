//! The survey context: the narrow interface the loader and the eviction
//! sweep consume from the rest of the application.
//!
//! Everything above this seam - preference dialogs, survey trees, the view
//! layer - is out of scope; the pipeline only needs the handful of
//! synchronous calls below. All of them are side-effect free except the
//! repaint callbacks, which must not block.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

use crate::format::PayloadKind;
use crate::tile::key::{TileExt, TileKey};
use crate::tile::node::Tile;

// =============================================================================
// Load Counters
// =============================================================================

/// Increment-only load statistics, read by the monitoring UI.
#[derive(Debug, Default)]
pub struct LoadCounters {
    /// Tiles successfully loaded from the network.
    pub net_loads: AtomicU64,
    /// Tiles successfully loaded from the on-disk cache.
    pub cache_loads: AtomicU64,
    /// Bytes read from the network.
    pub net_bytes: AtomicU64,
    /// Bytes read from the on-disk cache.
    pub cache_bytes: AtomicU64,
    /// Bytes written back to the on-disk cache.
    pub bytes_written: AtomicU64,
    /// Cumulative network load time in milliseconds.
    pub net_millis: AtomicU64,
    /// Cumulative cache load time in milliseconds.
    pub cache_millis: AtomicU64,
}

impl LoadCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_net_load(&self, bytes: u64, millis: u64) {
        self.net_loads.fetch_add(1, Ordering::Relaxed);
        self.net_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.net_millis.fetch_add(millis, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_load(&self, bytes: u64, millis: u64) {
        self.cache_loads.fetch_add(1, Ordering::Relaxed);
        self.cache_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.cache_millis.fetch_add(millis, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time copy for display.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            net_loads: self.net_loads.load(Ordering::Relaxed),
            cache_loads: self.cache_loads.load(Ordering::Relaxed),
            net_bytes: self.net_bytes.load(Ordering::Relaxed),
            cache_bytes: self.cache_bytes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            net_millis: self.net_millis.load(Ordering::Relaxed),
            cache_millis: self.cache_millis.load(Ordering::Relaxed),
        }
    }
}

/// Plain values of [`LoadCounters`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CountersSnapshot {
    pub net_loads: u64,
    pub cache_loads: u64,
    pub net_bytes: u64,
    pub cache_bytes: u64,
    pub bytes_written: u64,
    pub net_millis: u64,
    pub cache_millis: u64,
}

// =============================================================================
// SurveyContext Trait
// =============================================================================

/// Interface the load pipeline consumes from a survey.
///
/// All methods are synchronous and cheap; `on_tile_ready`/`on_tile_error`
/// request a repaint from the (external) view layer and must not block.
pub trait SurveyContext: Send + Sync + 'static {
    /// Survey identifier: the directory name under the cache root and the
    /// survey component of every [`TileKey`].
    fn survey_id(&self) -> &str;

    /// Root directory of the on-disk cache, if one is configured.
    fn cache_root(&self) -> Option<PathBuf>;

    /// Whether tiles may be read from and written back to the disk cache.
    fn caching_enabled(&self) -> bool;

    /// Base URL of the primary survey server.
    fn base_url(&self) -> String;

    /// Mirror failover policy.
    ///
    /// Called with `previous_failed = true` after a connection error on the
    /// current site; returns the alternate site to retry against, or `None`
    /// when no mirror exists.
    fn pick_mirror(&self, previous_failed: bool) -> Option<Url>;

    /// Wire format of this survey's tiles.
    fn tile_extension(&self) -> TileExt;

    /// The memoized payload classification, once resolved.
    fn payload_kind(&self) -> Option<PayloadKind>;

    /// Record the classification discovered from the first decoded tile.
    ///
    /// First resolution wins; returns the surviving value either way.
    fn resolve_payload_kind(&self, kind: PayloadKind) -> PayloadKind;

    /// `(pixel_min, pixel_max)` display range for raw-numeric rescale.
    fn pixel_range(&self) -> (f64, f64);

    /// True while the view is being interactively panned; selects the small
    /// fetch chunk size so abandoned tiles abort quickly.
    fn interactive(&self) -> bool {
        false
    }

    /// A tile reached `Ready`; request a repaint. Must not block.
    fn on_tile_ready(&self, tile: &Tile);

    /// A tile reached `Error`; request a repaint. Must not block.
    fn on_tile_error(&self, tile: &Tile);

    /// The survey's load statistics.
    fn counters(&self) -> &LoadCounters;

    /// Absolute URL of a tile on the primary site.
    ///
    /// Survey servers expose the same `Norder/Dir/Npix` tree as the cache,
    /// so the default composes the base URL with the shared layout.
    fn tile_url(&self, key: &TileKey) -> Option<Url> {
        let mut base = self.base_url();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).ok()?;
        base.join(&key.url_path(self.tile_extension())).ok()
    }
}
