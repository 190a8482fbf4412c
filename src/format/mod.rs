//! Tile payload codecs.
//!
//! Two wire/cache encodings exist:
//!
//! - [`raster`] - compressed JPEG tiles, decoded to indexed grayscale or
//!   packed ARGB depending on the survey.
//! - [`fits`] - raw-numeric FITS tiles carrying physical pixel values at
//!   one of several bit depths, rescaled to an 8-bit display range.
//!
//! [`PayloadKind`] names the four resulting payload classes. A survey's
//! kind is resolved once from its first successfully decoded tile and
//! memoized by the survey context (see `survey::SurveyContext`).

pub mod fits;
pub mod raster;

use crate::tile::key::TileExt;

/// Classification of a survey's tile payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// JPEG tiles decoding to packed ARGB.
    CompressedColor,
    /// JPEG tiles decoding to 8-bit indexed grayscale.
    CompressedGray,
    /// FITS tiles with numeric samples rescaled for display.
    RawNumeric,
    /// FITS tiles with a `COLORMOD = ARGB` packed-color payload.
    RawArgb,
}

impl PayloadKind {
    /// True for the JPEG-encoded kinds.
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            PayloadKind::CompressedColor | PayloadKind::CompressedGray
        )
    }

    /// The wire/cache file extension tiles of this kind use.
    pub fn extension(&self) -> TileExt {
        if self.is_compressed() {
            TileExt::Jpg
        } else {
            TileExt::Fits
        }
    }
}
