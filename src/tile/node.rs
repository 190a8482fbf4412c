//! The tile: one quadtree node of a survey.
//!
//! A tile either **owns** its payload (`depth == 0`; fetched from the cache
//! or the network) or **derives** it (`depth > 0`; cropped out of the
//! nearest self-owned ancestor's buffer). Derived tiles are READY from the
//! moment they are created - they need no fetch - but their buffer is only
//! materialized on first read.
//!
//! # Field ownership
//!
//! `status` is an atomic cell shared between the loader, the eviction sweep,
//! and abort requesters. Every other mutable field is touched only by the
//! single task currently responsible for the tile (its fetch task, or the
//! sweep once the tile is not in flight), so short `parking_lot` locks are
//! enough; nothing is held across a suspension point.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::buffer::{window_in_ancestor, TileBuffer};
use super::key::TileKey;
use super::state::{StatusCell, TileStatus};

/// Sentinel for "never loaded".
const NEVER: u64 = u64::MAX;

/// One HEALPIX tile of a survey. See the module docs.
pub struct Tile {
    key: TileKey,
    status: StatusCell,

    last_touch_ms: AtomicU64,
    loaded_at_ms: AtomicU64,
    priority: AtomicI32,

    buffer: RwLock<Option<TileBuffer>>,
    compressed: Mutex<Option<Bytes>>,

    depth: u8,
    ancestor: Option<Weak<Tile>>,
    children: Mutex<Option<[Arc<Tile>; 4]>>,

    cached_already: AtomicBool,
    is_base_plane: bool,
}

impl Tile {
    /// Create a self-owned tile in the `Unloaded` state.
    pub(crate) fn new_root(key: TileKey, is_base_plane: bool) -> Arc<Tile> {
        Arc::new(Tile {
            key,
            status: StatusCell::new(),
            last_touch_ms: AtomicU64::new(0),
            loaded_at_ms: AtomicU64::new(NEVER),
            priority: AtomicI32::new(0),
            buffer: RwLock::new(None),
            compressed: Mutex::new(None),
            depth: 0,
            ancestor: None,
            children: Mutex::new(None),
            cached_already: AtomicBool::new(false),
            is_base_plane,
        })
    }

    /// Create a derived tile. Derived tiles are READY immediately; their
    /// pixels come from `ancestor`, `depth` orders up.
    pub(crate) fn new_derived(key: TileKey, ancestor: &Arc<Tile>, depth: u8) -> Arc<Tile> {
        debug_assert!(depth > 0);
        debug_assert!(key.order == ancestor.key.order + depth);
        Arc::new(Tile {
            key,
            status: StatusCell::new_in(TileStatus::Ready),
            last_touch_ms: AtomicU64::new(0),
            loaded_at_ms: AtomicU64::new(NEVER),
            priority: AtomicI32::new(0),
            buffer: RwLock::new(None),
            compressed: Mutex::new(None),
            depth,
            ancestor: Some(Arc::downgrade(ancestor)),
            children: Mutex::new(None),
            cached_already: AtomicBool::new(false),
            is_base_plane: false,
        })
    }

    /// This tile's identity.
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    /// The load state cell.
    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    /// Distance to the nearest self-owned ancestor; 0 means self-owned.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// True when this tile borrows pixels from an ancestor.
    pub fn is_derived(&self) -> bool {
        self.depth > 0
    }

    /// True for the order-3 base plane, which is never evicted.
    pub fn is_base_plane(&self) -> bool {
        self.is_base_plane
    }

    /// The nearest self-owned ancestor, while it is still alive.
    pub fn ancestor(&self) -> Option<Arc<Tile>> {
        self.ancestor.as_ref().and_then(Weak::upgrade)
    }

    // =========================================================================
    // Timers & priority
    // =========================================================================

    /// Record an access at `now` (millis, see [`super::clock::now_ms`]).
    pub fn touch(&self, now_ms: u64) {
        self.last_touch_ms.store(now_ms, Ordering::Release);
    }

    /// Millis timestamp of the last access.
    pub fn last_touch(&self) -> u64 {
        self.last_touch_ms.load(Ordering::Acquire)
    }

    /// Record load completion at `now`.
    pub(crate) fn mark_loaded(&self, now_ms: u64) {
        self.loaded_at_ms.store(now_ms, Ordering::Release);
    }

    /// Millis timestamp of the last successful load, if any.
    pub fn loaded_at(&self) -> Option<u64> {
        match self.loaded_at_ms.load(Ordering::Acquire) {
            NEVER => None,
            v => Some(v),
        }
    }

    /// External scheduling hint; the load queue pops ascending priority.
    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Set the scheduling hint.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    // =========================================================================
    // Cache memoization
    // =========================================================================

    /// True once the tile is known to exist in the on-disk cache.
    pub fn cached_already(&self) -> bool {
        self.cached_already.load(Ordering::Acquire)
    }

    pub(crate) fn set_cached(&self, cached: bool) {
        self.cached_already.store(cached, Ordering::Release);
    }

    // =========================================================================
    // Buffer
    // =========================================================================

    /// True when decoded pixels are resident.
    pub fn has_buffer(&self) -> bool {
        self.buffer.read().is_some()
    }

    /// Install a freshly decoded buffer, optionally retaining the
    /// still-compressed stream for cache write-back.
    pub(crate) fn store_buffer(&self, buffer: TileBuffer, compressed: Option<Bytes>) {
        *self.buffer.write() = Some(buffer);
        *self.compressed.lock() = compressed;
    }

    /// Drop the decoded buffer and any retained compressed stream.
    pub(crate) fn clear_buffer(&self) {
        *self.buffer.write() = None;
        *self.compressed.lock() = None;
    }

    /// The retained compressed stream, if any.
    pub fn compressed_stream(&self) -> Option<Bytes> {
        self.compressed.lock().clone()
    }

    /// The lazily-instantiated children array.
    pub(crate) fn children_slot(&self) -> &Mutex<Option<[Arc<Tile>; 4]>> {
        &self.children
    }

    /// Currently instantiated children, if any.
    pub fn children(&self) -> Option<[Arc<Tile>; 4]> {
        self.children.lock().clone()
    }

    /// Make the buffer resident, materializing derived pixels from the
    /// ancestor chain if needed.
    ///
    /// For a derived tile this crops the ancestor's buffer at the
    /// accumulated quadrant offset; if the ancestor's own buffer is itself
    /// derived (or not yet materialized), the call recurses up the chain
    /// first. Returns `false` when no pixels can be produced - a self-owned
    /// tile that has not been loaded, or a reclaimed ancestor.
    pub fn ensure_buffer(self: &Arc<Self>) -> bool {
        if self.buffer.read().is_some() {
            return true;
        }

        let Some(ancestor) = self.ancestor() else {
            return false;
        };
        if !ancestor.ensure_buffer() {
            return false;
        }

        let crop = {
            let guard = ancestor.buffer.read();
            let Some(ab) = guard.as_ref() else {
                return false;
            };
            let rel_depth = self.key.order - ancestor.key.order;
            let (x, y, side) = window_in_ancestor(ab.width(), rel_depth, self.key.pixel);
            ab.crop(x, y, side, side)
        };

        match crop {
            Some(buffer) => {
                *self.buffer.write() = Some(buffer);
                true
            }
            None => false,
        }
    }

    /// Run `f` against the (possibly just-materialized) buffer.
    pub fn with_buffer<R>(self: &Arc<Self>, f: impl FnOnce(&TileBuffer) -> R) -> Option<R> {
        if !self.ensure_buffer() {
            return None;
        }
        let guard = self.buffer.read();
        guard.as_ref().map(f)
    }

    /// 8-bit display value at `(x, y)`, materializing if needed.
    pub fn display_at(self: &Arc<Self>, x: u32, y: u32) -> Option<u8> {
        self.with_buffer(|b| b.display_at(x, y)).flatten()
    }

    /// Approximate resident byte size, for logs and sweep stats.
    pub fn resident_bytes(&self) -> usize {
        let buf = self.buffer.read().as_ref().map_or(0, TileBuffer::byte_len);
        let stream = self.compressed.lock().as_ref().map_or(0, Bytes::len);
        buf + stream
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("status", &self.status.get())
            .field("depth", &self.depth)
            .field("base_plane", &self.is_base_plane)
            .field("buffer", &self.has_buffer())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
