//! I/O layer: the tile fetch seam and its HTTP implementation.

mod fetcher;
mod http;

pub use fetcher::{
    chunk_size, CancelProbe, NeverCancel, TileFetcher, CHUNK_BULK, CHUNK_INTERACTIVE,
};
pub use http::HttpTileFetcher;
