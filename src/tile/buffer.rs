//! Decoded tile pixel storage.
//!
//! A [`TileBuffer`] owns the decoded pixels of one tile in one of three
//! representations:
//!
//! - **Indexed8** - one byte per pixel, grayscale display values. Produced
//!   by grayscale JPEG tiles, by 8-bit FITS payloads, and by the rescale of
//!   deeper FITS payloads.
//! - **RawNumeric** - the native numeric samples (normalized to `f64`, blank
//!   values as NaN) alongside their 8-bit display mapping. Produced by
//!   16/32/-32/-64-bit FITS payloads.
//! - **Argb** - one packed `0xAARRGGBB` word per pixel. Produced by color
//!   JPEG tiles and by `COLORMOD = ARGB` FITS payloads.
//!
//! All representations are stored row-major, row 0 at the top (display
//! order); the FITS codec flips the on-disk bottom-up row order at decode
//! time.
//!
//! The buffer also owns the quadrant-crop operation used for ancestor pixel
//! derivation (§ quadtree): a child's pixels are a half-width crop of its
//! parent, and the crop offset for NESTED child `i` is
//! `dx = (i & 1) * w`, `dy = ((i >> 1) & 1) * w`.

use crate::format::fits::Bitpix;

// =============================================================================
// Pixel Storage
// =============================================================================

/// The pixel payload of a [`TileBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    /// 8-bit indexed grayscale display values.
    Indexed8(Vec<u8>),

    /// Raw numeric samples plus their 8-bit display mapping.
    ///
    /// `samples` holds the native values widened to `f64`; a sample equal to
    /// the header's BLANK keyword is stored as NaN and displays as index 0.
    RawNumeric {
        bitpix: Bitpix,
        samples: Vec<f64>,
        display: Vec<u8>,
    },

    /// Packed `0xAARRGGBB` color words.
    Argb(Vec<u32>),
}

/// Decoded pixels of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBuffer {
    width: u32,
    height: u32,
    pixels: Pixels,
}

impl TileBuffer {
    /// Wrap an 8-bit indexed grayscale buffer.
    ///
    /// # Panics
    /// Panics if `pixels.len() != width * height` (construction bug).
    pub fn indexed8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels: Pixels::Indexed8(pixels),
        }
    }

    /// Wrap raw numeric samples with their display mapping.
    pub fn raw_numeric(
        width: u32,
        height: u32,
        bitpix: Bitpix,
        samples: Vec<f64>,
        display: Vec<u8>,
    ) -> Self {
        assert_eq!(samples.len(), (width * height) as usize);
        assert_eq!(display.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels: Pixels::RawNumeric {
                bitpix,
                samples,
                display,
            },
        }
    }

    /// Wrap a packed ARGB buffer.
    pub fn argb(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels: Pixels::Argb(pixels),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Access the underlying pixel storage.
    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// True when the buffer holds packed color words.
    pub fn is_color(&self) -> bool {
        matches!(self.pixels, Pixels::Argb(_))
    }

    /// Approximate heap footprint in bytes, used by load counters.
    pub fn byte_len(&self) -> usize {
        match &self.pixels {
            Pixels::Indexed8(p) => p.len(),
            Pixels::RawNumeric {
                samples, display, ..
            } => samples.len() * 8 + display.len(),
            Pixels::Argb(p) => p.len() * 4,
        }
    }

    /// 8-bit display value at `(x, y)`.
    ///
    /// For ARGB buffers this is the green channel, which serves as a
    /// luminance proxy in the grayscale comparison paths of the tests.
    pub fn display_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) as usize;
        Some(match &self.pixels {
            Pixels::Indexed8(p) => p[idx],
            Pixels::RawNumeric { display, .. } => display[idx],
            Pixels::Argb(p) => ((p[idx] >> 8) & 0xFF) as u8,
        })
    }

    /// Packed ARGB word at `(x, y)`, for color buffers.
    pub fn argb_at(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match &self.pixels {
            Pixels::Argb(p) => Some(p[(y * self.width + x) as usize]),
            _ => None,
        }
    }

    /// Raw numeric sample at `(x, y)` (NaN for blank), for raw buffers.
    pub fn sample_at(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match &self.pixels {
            Pixels::RawNumeric { samples, .. } => Some(samples[(y * self.width + x) as usize]),
            _ => None,
        }
    }

    /// The 8-bit display plane of this buffer, regardless of representation.
    ///
    /// Used by the cache write-back path when no compressed stream was
    /// retained: the synthesized cache file stores exactly these bytes.
    pub fn display_plane(&self) -> Vec<u8> {
        match &self.pixels {
            Pixels::Indexed8(p) => p.clone(),
            Pixels::RawNumeric { display, .. } => display.clone(),
            Pixels::Argb(p) => p.iter().map(|v| ((v >> 8) & 0xFF) as u8).collect(),
        }
    }

    /// Crop a `w × h` window whose top-left corner is `(x0, y0)`.
    ///
    /// Every representation crops the same way: element `(x, y)` of the
    /// result is element `(x0 + x, y0 + y)` of `self`. Returns `None` when
    /// the window does not fit.
    pub fn crop(&self, x0: u32, y0: u32, w: u32, h: u32) -> Option<TileBuffer> {
        if x0 + w > self.width || y0 + h > self.height || w == 0 || h == 0 {
            return None;
        }

        fn crop_plane<T: Copy>(src: &[T], src_w: u32, x0: u32, y0: u32, w: u32, h: u32) -> Vec<T> {
            let mut out = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                let start = ((y0 + y) * src_w + x0) as usize;
                out.extend_from_slice(&src[start..start + w as usize]);
            }
            out
        }

        let pixels = match &self.pixels {
            Pixels::Indexed8(p) => Pixels::Indexed8(crop_plane(p, self.width, x0, y0, w, h)),
            Pixels::RawNumeric {
                bitpix,
                samples,
                display,
            } => Pixels::RawNumeric {
                bitpix: *bitpix,
                samples: crop_plane(samples, self.width, x0, y0, w, h),
                display: crop_plane(display, self.width, x0, y0, w, h),
            },
            Pixels::Argb(p) => Pixels::Argb(crop_plane(p, self.width, x0, y0, w, h)),
        };

        Some(TileBuffer {
            width: w,
            height: h,
            pixels,
        })
    }
}

// =============================================================================
// Quadrant Geometry
// =============================================================================

/// Top-left offset of NESTED child `i` within a parent of half-width `w`.
///
/// `0 ↦ (0,0)`, `1 ↦ (w,0)`, `2 ↦ (0,w)`, `3 ↦ (w,w)` in `(dx, dy)` terms.
#[inline]
pub fn quadrant_offset(child_index: u8, w: u32) -> (u32, u32) {
    debug_assert!(child_index < 4);
    let dx = (child_index as u32 & 1) * w;
    let dy = ((child_index as u32 >> 1) & 1) * w;
    (dx, dy)
}

/// Accumulated crop window of a descendant tile within its ancestor.
///
/// `ancestor_width` is the ancestor buffer's width, `depth` the number of
/// orders between ancestor and descendant, and `pixel` the descendant's
/// NESTED index. Returns `(x, y, side)`: the descendant's top-left corner
/// and its side length (`ancestor_width >> depth`).
pub fn window_in_ancestor(ancestor_width: u32, depth: u8, pixel: u64) -> (u32, u32, u32) {
    let mut side = ancestor_width;
    let (mut x, mut y) = (0u32, 0u32);
    for level in 1..=depth {
        side /= 2;
        let i = ((pixel >> (2 * (depth - level) as u64)) & 3) as u8;
        let (dx, dy) = quadrant_offset(i, side);
        x += dx;
        y += dy;
    }
    (x, y, side)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> TileBuffer {
        let pixels = (0..width * height).map(|i| (i % 251) as u8).collect();
        TileBuffer::indexed8(width, height, pixels)
    }

    #[test]
    fn test_quadrant_offsets() {
        assert_eq!(quadrant_offset(0, 4), (0, 0));
        assert_eq!(quadrant_offset(1, 4), (4, 0));
        assert_eq!(quadrant_offset(2, 4), (0, 4));
        assert_eq!(quadrant_offset(3, 4), (4, 4));
    }

    #[test]
    fn test_crop_matches_index_formula() {
        let buf = gradient(8, 8);
        let crop = buf.crop(2, 4, 4, 4).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                // out[(y, x)] == src[(y + y0) * width + (x + x0)]
                assert_eq!(
                    crop.display_at(x, y).unwrap(),
                    buf.display_at(x + 2, y + 4).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let buf = gradient(8, 8);
        assert!(buf.crop(6, 6, 4, 4).is_none());
        assert!(buf.crop(0, 0, 0, 4).is_none());
        assert!(buf.crop(0, 0, 9, 1).is_none());
    }

    #[test]
    fn test_crop_argb() {
        let pixels: Vec<u32> = (0..16).map(|i| 0xFF00_0000 | i).collect();
        let buf = TileBuffer::argb(4, 4, pixels);
        let crop = buf.crop(2, 2, 2, 2).unwrap();
        assert_eq!(crop.argb_at(0, 0), Some(0xFF00_0000 | 10));
        assert_eq!(crop.argb_at(1, 1), Some(0xFF00_0000 | 15));
    }

    #[test]
    fn test_crop_raw_numeric_keeps_samples_and_display() {
        let samples: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let display: Vec<u8> = (0..16).map(|i| i as u8 * 10).collect();
        let buf = TileBuffer::raw_numeric(4, 4, Bitpix::I16, samples, display);

        let crop = buf.crop(1, 1, 2, 2).unwrap();
        assert_eq!(crop.sample_at(0, 0), Some(5.0));
        assert_eq!(crop.display_at(0, 0), Some(50));
        assert_eq!(crop.sample_at(1, 1), Some(10.0));
    }

    #[test]
    fn test_window_in_ancestor_depth_one() {
        // Child 2 of a 512-wide parent sits at (0, 256).
        let (x, y, side) = window_in_ancestor(512, 1, 4 * 7 + 2);
        assert_eq!((x, y, side), (0, 256, 256));
    }

    #[test]
    fn test_window_in_ancestor_depth_two() {
        // Grandchild path: first hop child 3 (x=256, y=256 at side 256),
        // second hop child 1 (x+=128).
        let pixel = (4 * 3 + 1) as u64; // parent's child 3, then child 1
        let (x, y, side) = window_in_ancestor(512, 2, pixel);
        assert_eq!(side, 128);
        assert_eq!((x, y), (256 + 128, 256));
    }

    #[test]
    fn test_window_accumulation_equals_nested_crops() {
        let buf = gradient(16, 16);
        // Depth-2 descendant: child 2 of child 1.
        let pixel = (4 * 1 + 2) as u64;
        let (x, y, side) = window_in_ancestor(16, 2, pixel);
        let direct = buf.crop(x, y, side, side).unwrap();

        let (x1, y1, s1) = window_in_ancestor(16, 1, 1);
        let mid = buf.crop(x1, y1, s1, s1).unwrap();
        let (x2, y2, s2) = window_in_ancestor(s1, 1, pixel);
        let nested = mid.crop(x2, y2, s2, s2).unwrap();

        assert_eq!(direct, nested);
    }

    #[test]
    fn test_byte_len() {
        assert_eq!(gradient(4, 4).byte_len(), 16);
        let raw = TileBuffer::raw_numeric(2, 2, Bitpix::F32, vec![0.0; 4], vec![0; 4]);
        assert_eq!(raw.byte_len(), 4 * 8 + 4);
    }

    #[test]
    fn test_display_plane_from_argb_uses_green() {
        let buf = TileBuffer::argb(1, 1, vec![0xFF11_2233]);
        assert_eq!(buf.display_plane(), vec![0x22]);
        assert_eq!(buf.display_at(0, 0), Some(0x22));
    }
}
