//! Tile layer: the quadtree, its state machine, and the load/evict
//! pipelines.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  Loader                     │
//! │  claim → cache/net route → decode → Ready   │
//! │  (chunked reads, cooperative cancellation)  │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//!            ▼                      ▼
//! ┌────────────────────┐  ┌────────────────────┐
//! │     TileArena      │  │     CacheStore     │
//! │  (order, pixel) →  │  │  Norder/Dir/Npix   │
//! │  Arc<Tile> quadtree│  │  on-disk tree      │
//! └──────────┬─────────┘  └────────────────────┘
//!            │                      ▲
//!            ▼                      │
//! ┌────────────────────┐           │
//! │   EvictionSweep    │───────────┘
//! │  age classify →    │   (write-back before
//! │  free → purge      │    reclamation)
//! └────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`key::TileKey`]: `(survey, order, pixel)` identity and the cache path
//! - [`state::StatusCell`]: the atomic load state machine
//! - [`buffer::TileBuffer`]: decoded pixels and quadrant cropping
//! - [`node::Tile`]: one quadtree node, self-owned or ancestor-derived
//! - [`arena::TileArena`]: per-survey registry, lazy NESTED children
//! - [`loader::Loader`]: the load pipeline and its worker pool
//! - [`eviction::EvictionSweep`]: age classification and reclamation

pub mod arena;
pub mod buffer;
pub mod clock;
pub mod eviction;
pub mod key;
pub mod loader;
pub mod node;
pub mod state;

pub use arena::{TileArena, BASE_ORDER};
pub use buffer::{quadrant_offset, window_in_ancestor, Pixels, TileBuffer};
pub use eviction::{
    classify_age, EvictionSweep, FreeOutcome, Liveness, SweepConfig, SweepStats,
    DEFAULT_GRACE, DEFAULT_LIVE_WINDOW, DEFAULT_SWEEP_INTERVAL,
};
pub use key::{cache_path, TileExt, TileKey};
pub use loader::{abort, Loader, DEFAULT_WORKERS};
pub use node::Tile;
pub use state::{transition_allowed, StatusCell, TileStatus};
