//! # HiPS Streamer
//!
//! A hierarchical sky-tile cache and loader for HEALPix-indexed (HiPS)
//! astronomical imagery.
//!
//! This library implements the tile subsystem that backs progressive,
//! multi-resolution sky rendering: a per-survey quadtree of tiles addressed
//! by `(order, pixel)` in the HEALPIX NESTED scheme, loaded asynchronously
//! from an on-disk cache or a survey server with mirror failover, decoded
//! from JPEG or FITS payloads, aged out under memory pressure, and written
//! back to the cache before being dropped.
//!
//! ## Features
//!
//! - **Quadtree tiles**: children derive their pixels from an already-loaded
//!   ancestor by quadrant cropping, so zooming never blocks on the network
//! - **Cache-first loading**: tiles known to exist on disk are read locally;
//!   everything else streams from the survey server in cancellation-polled
//!   chunks
//! - **Mirror failover**: one retry against an alternate site after a
//!   connection error (never after a definitive not-found)
//! - **Format support**: JPEG rasters (grayscale or color, classified once
//!   per survey) and FITS raw-numeric payloads at 8/16/32/-32/-64 bits with
//!   blank handling and display rescale
//! - **Timer-based eviction**: a periodic sweep classifies tiles as
//!   alive/aging/dead by last touch and reclaims the dead, writing
//!   not-yet-cached payloads back to the standard `Norder/Dir/Npix` tree
//!
//! ## Architecture
//!
//! - [`io`] - the tile fetch seam and its HTTP implementation
//! - [`mod@format`] - JPEG and FITS payload codecs
//! - [`tile`] - the quadtree, state machine, loader, and eviction sweep
//! - [`store`] - the on-disk cache tree
//! - [`survey`] - the survey context consumed by the pipeline
//! - [`config`] - CLI types for the `hips-streamer` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hips_streamer::{HttpTileFetcher, Loader, Survey, SurveyConfig, TileArena, TileExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let survey = Arc::new(Survey::new(SurveyConfig {
//!         id: "DSS2-color".to_string(),
//!         base_url: "https://alasky.example.org/DSS2-color".to_string(),
//!         mirrors: vec![],
//!         format: TileExt::Jpg,
//!         cache_root: Some("/var/cache/hips".into()),
//!         pixel_min: 0.0,
//!         pixel_max: 255.0,
//!     }));
//!
//!     let arena = TileArena::new("DSS2-color");
//!     let loader = Loader::new(survey, Arc::new(HttpTileFetcher::new()));
//!
//!     let tile = arena.get_or_create(3, 17);
//!     loader.load_now(&tile).await.expect("tile load");
//!     println!("tile {} is {:?}", tile.key(), tile.status().get());
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod store;
pub mod survey;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, FetchConfig, PathConfig};
pub use error::{CacheError, FetchError, FitsError, LoadError};
pub use format::{fits, raster, PayloadKind};
pub use io::{
    chunk_size, CancelProbe, HttpTileFetcher, NeverCancel, TileFetcher, CHUNK_BULK,
    CHUNK_INTERACTIVE,
};
pub use store::CacheStore;
pub use survey::{CountersSnapshot, LoadCounters, Survey, SurveyConfig, SurveyContext};
pub use tile::{
    abort, cache_path, classify_age, quadrant_offset, transition_allowed, window_in_ancestor,
    EvictionSweep, FreeOutcome, Liveness, Loader, Pixels, StatusCell, SweepConfig, SweepStats,
    Tile, TileArena, TileBuffer, TileExt, TileKey, TileStatus, BASE_ORDER, DEFAULT_GRACE,
    DEFAULT_LIVE_WINDOW, DEFAULT_SWEEP_INTERVAL, DEFAULT_WORKERS,
};
