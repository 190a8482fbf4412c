//! Tile identity and the deterministic cache-path layout.
//!
//! A tile is addressed by its HEALPIX NESTED coordinates `(order, pixel)`
//! within a named survey. The on-disk layout groups tiles by resolution
//! order and by 10,000-pixel directory buckets, matching the standard HiPS
//! tree so existing cache directories remain readable:
//!
//! ```text
//! <root>/<survey>/Norder<N>/Dir<floor(pix/10000)*10000>/Npix<pix>.<ext>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

/// Width of a directory bucket in the `Dir` path component.
const DIR_BUCKET: u64 = 10_000;

// =============================================================================
// Tile Extension
// =============================================================================

/// On-disk / wire file extension of a tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileExt {
    /// Compressed raster tile (stored verbatim as received).
    Jpg,
    /// Raw-numeric tile (FITS header + pixel payload).
    Fits,
}

impl TileExt {
    /// The extension string without a leading dot.
    pub fn as_str(&self) -> &'static str {
        match self {
            TileExt::Jpg => "jpg",
            TileExt::Fits => "fits",
        }
    }
}

impl std::fmt::Display for TileExt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tile Key
// =============================================================================

/// Identity of a tile: survey, resolution order, and NESTED pixel index.
///
/// Pure value type. `nside = 2^order`; the 4 children of pixel `p` at the
/// next order are `4p .. 4p+3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Survey identifier (directory name under the cache root).
    pub survey: Arc<str>,

    /// HEALPIX resolution order; `nside = 2^order`.
    pub order: u8,

    /// HEALPIX NESTED pixel index at `order`.
    pub pixel: u64,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(survey: impl Into<Arc<str>>, order: u8, pixel: u64) -> Self {
        Self {
            survey: survey.into(),
            order,
            pixel,
        }
    }

    /// Key of the parent tile, or `None` at order 0.
    pub fn parent(&self) -> Option<TileKey> {
        if self.order == 0 {
            return None;
        }
        Some(TileKey {
            survey: self.survey.clone(),
            order: self.order - 1,
            pixel: self.pixel / 4,
        })
    }

    /// Key of child `i` (NESTED order, 0..=3).
    pub fn child(&self, i: u8) -> TileKey {
        debug_assert!(i < 4);
        TileKey {
            survey: self.survey.clone(),
            order: self.order + 1,
            pixel: self.pixel * 4 + i as u64,
        }
    }

    /// NESTED child index of this tile within its parent (0..=3).
    pub fn child_index(&self) -> u8 {
        (self.pixel & 3) as u8
    }

    /// Relative cache path for this tile with the given extension.
    pub fn cache_path(&self, ext: TileExt) -> PathBuf {
        cache_path(&self.survey, self.order, self.pixel, ext)
    }

    /// Relative URL path for this tile on a HiPS server.
    ///
    /// Identical layout to the cache path; servers and caches share the tree
    /// structure.
    pub fn url_path(&self, ext: TileExt) -> String {
        format!(
            "Norder{}/Dir{}/Npix{}.{}",
            self.order,
            (self.pixel / DIR_BUCKET) * DIR_BUCKET,
            self.pixel,
            ext
        )
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.survey, self.order, self.pixel)
    }
}

/// Compute the relative cache path for a tile.
///
/// Pure, deterministic function of its inputs:
/// `<survey>/Norder<order>/Dir<floor(pixel/10000)*10000>/Npix<pixel>.<ext>`.
pub fn cache_path(survey: &str, order: u8, pixel: u64, ext: TileExt) -> PathBuf {
    let dir = (pixel / DIR_BUCKET) * DIR_BUCKET;
    let mut path = PathBuf::from(survey);
    path.push(format!("Norder{order}"));
    path.push(format!("Dir{dir}"));
    path.push(format!("Npix{pixel}.{ext}"));
    path
}

// =============================================================================
// Tests
// =============================================================================
