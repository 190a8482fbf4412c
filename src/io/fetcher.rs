//! Tile fetch abstraction.
//!
//! [`TileFetcher`] is the seam between the load pipeline and the transport:
//! it fetches one whole tile payload, reading in chunks and polling a
//! [`CancelProbe`] between chunks. The chunk boundaries are the pipeline's
//! only suspension points, so cancellation latency is bounded by the chunk
//! size without any preemptive task interruption.
//!
//! The chunk size is a hint from the caller: small while the sky view is
//! being interactively panned (abandoned tiles abort quickly), large
//! otherwise (fewer polls, better throughput).

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::FetchError;

/// Chunk size while the view is interactively panned.
pub const CHUNK_INTERACTIVE: usize = 512;

/// Chunk size for bulk loading.
pub const CHUNK_BULK: usize = 8 * 1024;

/// Pick the chunk size for the current interaction mode.
#[inline]
pub fn chunk_size(interactive: bool) -> usize {
    if interactive {
        CHUNK_INTERACTIVE
    } else {
        CHUNK_BULK
    }
}

// =============================================================================
// Cancellation Probe
// =============================================================================

/// Cooperative-cancellation check polled at every chunk boundary.
///
/// The tile's status cell implements this (cancelled ⇔ `Aborting`), so the
/// fetcher and the cache reader observe an abort without knowing anything
/// about tiles.
pub trait CancelProbe: Send + Sync {
    /// True when the in-flight operation should unwind.
    fn cancelled(&self) -> bool;
}

/// A probe that never cancels, for synchronous one-shot use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelProbe for NeverCancel {
    fn cancelled(&self) -> bool {
        false
    }
}

impl CancelProbe for crate::tile::state::StatusCell {
    fn cancelled(&self) -> bool {
        self.is_aborting()
    }
}

// =============================================================================
// TileFetcher Trait
// =============================================================================

/// Trait for fetching a complete tile payload from a remote site.
///
/// Implementations must be thread-safe; the loader shares one fetcher across
/// all concurrent tile tasks.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetch the payload at `url`.
    ///
    /// Reads in chunks of roughly `chunk` bytes where the transport allows
    /// and polls `cancel` between chunks, returning
    /// [`FetchError::Cancelled`] as soon as a cancellation is observed.
    ///
    /// A definitive "no such tile" maps to [`FetchError::NotFound`]; any
    /// other failure maps to [`FetchError::Connection`].
    async fn fetch(
        &self,
        url: &Url,
        chunk: usize,
        cancel: &dyn CancelProbe,
    ) -> Result<Bytes, FetchError>;
}
