use thiserror::Error;

/// Errors that can occur when fetching a tile payload from the network.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The server definitively reported that the tile does not exist.
    ///
    /// Not-found is terminal: it never triggers a mirror retry.
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// Network or connection error (refused, reset, timeout, bad gateway).
    ///
    /// Connection errors are transient and trigger one mirror retry.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The fetch observed a cancellation request at a chunk boundary.
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Errors that can occur when parsing a raw-numeric (FITS) payload.
#[derive(Debug, Clone, Error)]
pub enum FitsError {
    /// The payload ends before a complete 2,880-byte header block.
    #[error("Truncated header: need {required} bytes, got {actual}")]
    TruncatedHeader { required: usize, actual: usize },

    /// The header has no END record within the scanned blocks.
    #[error("Header has no END record")]
    UnterminatedHeader,

    /// A required header keyword is missing.
    #[error("Missing required keyword: {0}")]
    MissingKeyword(&'static str),

    /// A header keyword has an unparseable or out-of-range value.
    #[error("Invalid value for {keyword}: {message}")]
    InvalidKeyword {
        keyword: &'static str,
        message: String,
    },

    /// The BITPIX code is not one of 8, 16, 32, -32, -64.
    #[error("Unsupported BITPIX: {0}")]
    UnsupportedBitpix(i64),

    /// The pixel payload is shorter than NAXIS1 * NAXIS2 elements.
    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },
}

/// Errors that can occur when reading or writing the on-disk tile cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Filesystem error at the given path.
    #[error("Cache I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// The cache read observed a cancellation request at a chunk boundary.
    #[error("Cache read cancelled")]
    Cancelled,
}

/// Errors from the tile load pipeline.
///
/// `Cancelled` is not a failure: the tile returns to `Unloaded` and may be
/// re-requested. Every other variant leaves the tile in `Error`.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Network fetch failed on the primary site and (if any) the mirror.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Raw-numeric payload could not be decoded.
    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),

    /// Compressed raster payload could not be decoded.
    #[error("Raster decode error: {message}")]
    Raster { message: String },

    /// On-disk cache access failed.
    #[error("Cache error: {0}")]
    Cache(CacheError),

    /// A derived tile (depth > 0) was submitted for an independent fetch.
    #[error("Tile at order {order} pixel {pixel} is derived and cannot be fetched")]
    DerivedTile { order: u8, pixel: u64 },

    /// Another task already owns this tile's load attempt.
    #[error("Tile load already in flight")]
    AlreadyInFlight,

    /// The load observed a cancellation request and unwound.
    #[error("Load cancelled")]
    Cancelled,
}

impl From<CacheError> for LoadError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Cancelled => LoadError::Cancelled,
            other => LoadError::Cache(other),
        }
    }
}

impl LoadError {
    /// True when the error is the cooperative-abort path rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            LoadError::Cancelled
                | LoadError::Fetch(FetchError::Cancelled)
                | LoadError::Cache(CacheError::Cancelled)
        )
    }
}
