//! Compressed-raster (JPEG) tile codec.
//!
//! Visual HiPS surveys ship tiles as ordinary JPEG files. Decode produces
//! either an 8-bit indexed buffer (grayscale survey) or a packed ARGB buffer
//! (color survey). Which of the two a survey uses is not declared anywhere;
//! it is discovered from the first successfully decoded tile and memoized by
//! the survey context, so classification here is per-payload and the caller
//! resolves the survey-wide answer once.

use std::io::Cursor;

use image::{DynamicImage, ImageReader};

use crate::error::LoadError;
use crate::format::PayloadKind;
use crate::tile::buffer::TileBuffer;

/// Decode a compressed-raster payload.
///
/// Returns the decoded buffer and the payload classification
/// ([`PayloadKind::CompressedGray`] or [`PayloadKind::CompressedColor`]).
///
/// When `resolved` carries the survey's memoized classification, the decode
/// honors it: a color survey's occasional grayscale-encoded tile is expanded
/// to ARGB so all buffers share one representation, and vice versa a
/// grayscale survey's tile collapses to its luma plane.
pub fn decode(
    data: &[u8],
    resolved: Option<PayloadKind>,
) -> Result<(TileBuffer, PayloadKind), LoadError> {
    let cursor = Cursor::new(data);
    let reader = ImageReader::with_format(cursor, image::ImageFormat::Jpeg);

    let img = reader.decode().map_err(|e| LoadError::Raster {
        message: e.to_string(),
    })?;

    let classified = classify(&img);
    let kind = match resolved {
        Some(kind) if kind.is_compressed() => kind,
        _ => classified,
    };

    let buffer = match kind {
        PayloadKind::CompressedGray => gray_buffer(&img),
        _ => color_buffer(&img),
    };

    Ok((buffer, classified))
}

/// Classify a decoded image as a grayscale or color payload.
fn classify(img: &DynamicImage) -> PayloadKind {
    match img.color() {
        image::ColorType::L8
        | image::ColorType::L16
        | image::ColorType::La8
        | image::ColorType::La16 => PayloadKind::CompressedGray,
        _ => PayloadKind::CompressedColor,
    }
}

fn gray_buffer(img: &DynamicImage) -> TileBuffer {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    TileBuffer::indexed8(w, h, gray.into_raw())
}

fn color_buffer(img: &DynamicImage) -> TileBuffer {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let pixels = rgba
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
        })
        .collect();
    TileBuffer::argb(w, h, pixels)
}

// =============================================================================
// Tests
// =============================================================================
