//! On-disk tile cache.
//!
//! The cache mirrors the survey server's tree layout under a local root:
//!
//! ```text
//! <root>/<survey>/Norder<N>/Dir<floor(pix/10000)*10000>/Npix<pix>.<ext>
//! ```
//!
//! so an existing cache directory populated by other tools stays readable,
//! and files written here are readable by them.
//!
//! # Write semantics
//!
//! Writes delete any pre-existing file at the target path, create missing
//! parent directories, and then create the file. There is deliberately no
//! temp-file-and-rename step: external tooling scans these trees and the
//! historical cache format has always exposed in-progress files. Two tasks
//! writing the same path concurrently (two views requesting one tile) are
//! not serialized; the last writer wins and a reader may observe a torn
//! file, which the loader treats as a corrupt cache entry and deletes.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::io::CancelProbe;
use crate::tile::key::{TileExt, TileKey};

/// Persistent byte store for tile payloads under a cache root.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `root`. The directory need not exist yet;
    /// it is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a tile's cache file.
    pub fn path_for(&self, key: &TileKey, ext: TileExt) -> PathBuf {
        self.root.join(key.cache_path(ext))
    }

    /// Whether a cache file exists for the tile.
    pub async fn contains(&self, key: &TileKey, ext: TileExt) -> bool {
        fs::try_exists(self.path_for(key, ext))
            .await
            .unwrap_or(false)
    }

    /// Read a tile's cache file in chunks, polling `cancel` between chunks.
    pub async fn read(
        &self,
        key: &TileKey,
        ext: TileExt,
        chunk: usize,
        cancel: &dyn CancelProbe,
    ) -> Result<Bytes, CacheError> {
        let path = self.path_for(key, ext);
        let io_err = |e: std::io::Error| CacheError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut file = fs::File::open(&path).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len() as usize;

        let mut out = BytesMut::with_capacity(len);
        let mut buf = vec![0u8; chunk.max(1)];
        loop {
            if cancel.cancelled() {
                return Err(CacheError::Cancelled);
            }
            let n = file.read(&mut buf).await.map_err(io_err)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        debug!(tile = %key, bytes = out.len(), "cache read");
        Ok(out.freeze())
    }

    /// Write a tile's cache file.
    ///
    /// Deletes any pre-existing file first, then creates parent directories
    /// and the new file. Not atomic; see the module docs.
    pub async fn write(&self, key: &TileKey, ext: TileExt, data: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key, ext);
        let io_err = |e: std::io::Error| CacheError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await.map_err(io_err)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        fs::write(&path, data).await.map_err(io_err)?;

        debug!(tile = %key, bytes = data.len(), "cache write");
        Ok(())
    }

    /// Remove a tile's cache file, e.g. after a corrupt read.
    ///
    /// Missing files are not an error; removal failures are logged and
    /// swallowed so a read-only cache never blocks the network fallback.
    pub async fn remove(&self, key: &TileKey, ext: TileExt) {
        let path = self.path_for(key, ext);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(tile = %key, "removed corrupt cache entry"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(tile = %key, error = %e, "failed to remove cache entry"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
