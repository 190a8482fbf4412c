//! Raw-numeric (FITS) tile codec.
//!
//! HiPS surveys that carry physical pixel values ship tiles as minimal FITS
//! files: one or more 2,880-byte header blocks of 80-byte `KEY = VALUE`
//! records terminated by an `END` record, followed by a big-endian pixel
//! payload of `NAXIS1 × NAXIS2` elements. The element width is the signed
//! `BITPIX` code: 8, 16, 32 for integers, −32/−64 for IEEE floats.
//!
//! # Decode pipeline
//!
//! - Integer and float payloads use distinct decoders; a sample equal to the
//!   header's `BLANK` value maps to NaN.
//! - When `BITPIX ≠ 8` the samples are rescaled to an 8-bit display range
//!   `[pixel_min, pixel_max]`:
//!   `out = round((clamp(v, min, max) - min) * 255 / (max - min))`,
//!   with NaN displaying as index 0 (transparent).
//! - FITS stores rows bottom-up; decode inverts line order so buffers are
//!   top-down. The inversion happens during the rescale pass for deep
//!   payloads and as a plain row flip for 8-bit payloads.
//! - A `COLORMOD = ARGB` header selects an already-packed 32-bit ARGB
//!   payload, skipping rescale entirely.
//!
//! # Cache synthesis
//!
//! [`synthesize_cache_file`] builds the 8-bit FITS file written back to the
//! on-disk cache when no compressed stream was retained: a minimal header
//! (`SIMPLE`, `BITPIX`, `NAXIS`, `NAXIS1/2`, `NORDER`, `NPIX`) and the
//! display plane with lines re-inverted to on-disk row order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FitsError;
use crate::tile::buffer::TileBuffer;

/// FITS header block size; headers are padded to a multiple of this.
pub const HEADER_BLOCK: usize = 2_880;

/// Length of one header record.
pub const RECORD_LEN: usize = 80;

/// Records per header block.
const RECORDS_PER_BLOCK: usize = HEADER_BLOCK / RECORD_LEN;

// =============================================================================
// Bitpix
// =============================================================================

/// Element width of a raw-numeric payload, from the signed BITPIX code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bitpix {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 32-bit IEEE float (code −32).
    F32,
    /// 64-bit IEEE float (code −64).
    F64,
}

impl Bitpix {
    /// Parse a signed BITPIX code.
    pub fn from_code(code: i64) -> Result<Bitpix, FitsError> {
        match code {
            8 => Ok(Bitpix::U8),
            16 => Ok(Bitpix::I16),
            32 => Ok(Bitpix::I32),
            -32 => Ok(Bitpix::F32),
            -64 => Ok(Bitpix::F64),
            other => Err(FitsError::UnsupportedBitpix(other)),
        }
    }

    /// The signed BITPIX code.
    pub fn code(&self) -> i64 {
        match self {
            Bitpix::U8 => 8,
            Bitpix::I16 => 16,
            Bitpix::I32 => 32,
            Bitpix::F32 => -32,
            Bitpix::F64 => -64,
        }
    }

    /// Bytes per pixel element.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Bitpix::U8 => 1,
            Bitpix::I16 => 2,
            Bitpix::I32 | Bitpix::F32 => 4,
            Bitpix::F64 => 8,
        }
    }

    /// True for the integer decoders.
    pub fn is_integer(&self) -> bool {
        matches!(self, Bitpix::U8 | Bitpix::I16 | Bitpix::I32)
    }
}

// =============================================================================
// Header
// =============================================================================

/// A parsed FITS header: keyword/value records up to `END`.
#[derive(Debug, Clone)]
pub struct FitsHeader {
    records: Vec<(String, String)>,
    /// Offset of the first payload byte (next block boundary after END).
    data_offset: usize,
}

impl FitsHeader {
    /// Parse header blocks from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<FitsHeader, FitsError> {
        let mut records = Vec::new();
        let mut index = 0usize;

        loop {
            let start = index * RECORD_LEN;
            let end = start + RECORD_LEN;
            if end > data.len() {
                return if records.is_empty() {
                    Err(FitsError::TruncatedHeader {
                        required: HEADER_BLOCK,
                        actual: data.len(),
                    })
                } else {
                    Err(FitsError::UnterminatedHeader)
                };
            }

            let record = &data[start..end];
            let keyword = std::str::from_utf8(&record[0..8])
                .unwrap_or("")
                .trim()
                .to_string();

            if keyword == "END" {
                let blocks = index / RECORDS_PER_BLOCK + 1;
                return Ok(FitsHeader {
                    records,
                    data_offset: blocks * HEADER_BLOCK,
                });
            }

            if !keyword.is_empty()
                && keyword != "COMMENT"
                && keyword != "HISTORY"
                && record.get(8..10) == Some(b"= ".as_slice())
            {
                let value = parse_value(&record[10..]);
                records.push((keyword, value));
            }

            index += 1;
        }
    }

    /// Offset of the first payload byte.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Raw string value of a keyword, if present.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }

    /// Integer value of a required keyword.
    pub fn get_i64(&self, keyword: &'static str) -> Result<i64, FitsError> {
        let raw = self.get(keyword).ok_or(FitsError::MissingKeyword(keyword))?;
        raw.parse::<i64>().map_err(|e| FitsError::InvalidKeyword {
            keyword,
            message: format!("{raw:?}: {e}"),
        })
    }

    /// Float value of an optional keyword.
    pub fn get_f64(&self, keyword: &'static str) -> Result<Option<f64>, FitsError> {
        match self.get(keyword) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|e| FitsError::InvalidKeyword {
                    keyword,
                    message: format!("{raw:?}: {e}"),
                }),
        }
    }

    /// True when `COLORMOD = ARGB` selects the packed-color payload variant.
    pub fn is_argb(&self) -> bool {
        self.get("COLORMOD").is_some_and(|v| v == "ARGB")
    }
}

/// Extract a record's value text: strip the trailing comment, unquote
/// strings, trim whitespace.
fn parse_value(field: &[u8]) -> String {
    let text = std::str::from_utf8(field).unwrap_or("");
    let trimmed = text.trim_start();

    if let Some(rest) = trimmed.strip_prefix('\'') {
        // Quoted string; comment delimiters inside quotes are literal.
        match rest.find('\'') {
            Some(close) => rest[..close].trim_end().to_string(),
            None => rest.trim_end().to_string(),
        }
    } else {
        let bare = match trimmed.find('/') {
            Some(slash) => &trimmed[..slash],
            None => trimmed,
        };
        bare.trim().to_string()
    }
}

// =============================================================================
// Rescale
// =============================================================================

/// Map one raw sample into the 8-bit display range `[min, max]`.
///
/// NaN (blank) maps to index 0; values at or below `min` map to 0, values at
/// or above `max` map to 255.
#[inline]
pub fn rescale(v: f64, min: f64, max: f64) -> u8 {
    if v.is_nan() || max <= min {
        return 0;
    }
    let clamped = v.clamp(min, max);
    ((clamped - min) * 255.0 / (max - min)).round() as u8
}

// =============================================================================
// Decode
// =============================================================================

/// Decode a raw-numeric tile payload.
///
/// `pixel_range` is the survey's `(pixel_min, pixel_max)` display range used
/// by the rescale of deep payloads. The returned buffer is top-down.
pub fn decode(data: &[u8], pixel_range: (f64, f64)) -> Result<TileBuffer, FitsError> {
    let header = FitsHeader::parse(data)?;
    let bitpix = Bitpix::from_code(header.get_i64("BITPIX")?)?;
    let width = parse_axis(&header, "NAXIS1")?;
    let height = parse_axis(&header, "NAXIS2")?;
    let blank = header.get_f64("BLANK")?;

    let expected = (width * height) as usize * bitpix.bytes_per_pixel();
    let payload = data.get(header.data_offset()..).unwrap_or(&[]);
    if payload.len() < expected {
        return Err(FitsError::TruncatedPayload {
            expected,
            actual: payload.len(),
        });
    }
    let payload = &payload[..expected];

    if header.is_argb() {
        if bitpix != Bitpix::I32 {
            return Err(FitsError::InvalidKeyword {
                keyword: "COLORMOD",
                message: format!("ARGB payload requires BITPIX=32, got {}", bitpix.code()),
            });
        }
        return Ok(decode_argb(payload, width, height));
    }

    match bitpix {
        Bitpix::U8 => Ok(decode_u8(payload, width, height)),
        _ => Ok(decode_deep(
            payload,
            width,
            height,
            bitpix,
            blank,
            pixel_range,
        )),
    }
}

fn parse_axis(header: &FitsHeader, keyword: &'static str) -> Result<u32, FitsError> {
    let v = header.get_i64(keyword)?;
    if v <= 0 || v > u32::MAX as i64 {
        return Err(FitsError::InvalidKeyword {
            keyword,
            message: format!("axis length {v} out of range"),
        });
    }
    Ok(v as u32)
}

/// 8-bit payload: already display values, only the row order flips.
fn decode_u8(payload: &[u8], width: u32, height: u32) -> TileBuffer {
    let (w, h) = (width as usize, height as usize);
    let mut pixels = vec![0u8; w * h];
    for y in 0..h {
        let src = (h - 1 - y) * w;
        pixels[y * w..(y + 1) * w].copy_from_slice(&payload[src..src + w]);
    }
    TileBuffer::indexed8(width, height, pixels)
}

/// Packed ARGB payload: one big-endian word per pixel, rows flipped.
fn decode_argb(payload: &[u8], width: u32, height: u32) -> TileBuffer {
    let (w, h) = (width as usize, height as usize);
    let mut pixels = vec![0u32; w * h];
    for y in 0..h {
        let src_row = h - 1 - y;
        for x in 0..w {
            let off = (src_row * w + x) * 4;
            pixels[y * w + x] = u32::from_be_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ]);
        }
    }
    TileBuffer::argb(width, height, pixels)
}

/// 16/32/-32/-64-bit payload: distinct integer/float element readers, blank
/// handling, and the rescale pass that also inverts line order.
fn decode_deep(
    payload: &[u8],
    width: u32,
    height: u32,
    bitpix: Bitpix,
    blank: Option<f64>,
    pixel_range: (f64, f64),
) -> TileBuffer {
    let (w, h) = (width as usize, height as usize);
    let (min, max) = pixel_range;
    let bpp = bitpix.bytes_per_pixel();

    let read = |idx: usize| -> f64 {
        let off = idx * bpp;
        match bitpix {
            Bitpix::I16 => i16::from_be_bytes([payload[off], payload[off + 1]]) as f64,
            Bitpix::I32 => i32::from_be_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ]) as f64,
            Bitpix::F32 => f32::from_be_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ]) as f64,
            Bitpix::F64 => f64::from_be_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
                payload[off + 4],
                payload[off + 5],
                payload[off + 6],
                payload[off + 7],
            ]),
            Bitpix::U8 => unreachable!("handled by decode_u8"),
        }
    };

    let mut samples = vec![0f64; w * h];
    let mut display = vec![0u8; w * h];
    for y in 0..h {
        let src_row = h - 1 - y;
        for x in 0..w {
            let mut v = read(src_row * w + x);
            if blank.is_some_and(|b| v == b) {
                v = f64::NAN;
            }
            let dst = y * w + x;
            samples[dst] = v;
            display[dst] = rescale(v, min, max);
        }
    }
    TileBuffer::raw_numeric(width, height, bitpix, samples, display)
}

// =============================================================================
// Cache Synthesis
// =============================================================================

/// Format one 80-byte header record.
fn record(keyword: &str, value: &str) -> [u8; RECORD_LEN] {
    let mut out = [b' '; RECORD_LEN];
    let text = format!("{keyword:<8}= {value:>20}");
    out[..text.len()].copy_from_slice(text.as_bytes());
    out
}

/// Synthesize the 8-bit FITS cache file for a tile's display plane.
///
/// Header: `SIMPLE`, `BITPIX=8`, `NAXIS=2`, `NAXIS1/2`, `NORDER`, `NPIX`,
/// `END`, padded to one 2,880-byte block. Payload: `display` rows
/// re-inverted so row 0 is stored last, matching the on-disk convention the
/// decoder flips back.
pub fn synthesize_cache_file(
    order: u8,
    pixel: u64,
    width: u32,
    height: u32,
    display: &[u8],
) -> Bytes {
    debug_assert_eq!(display.len(), (width * height) as usize);

    let mut out = BytesMut::with_capacity(HEADER_BLOCK + display.len());
    out.put_slice(&record("SIMPLE", "T"));
    out.put_slice(&record("BITPIX", "8"));
    out.put_slice(&record("NAXIS", "2"));
    out.put_slice(&record("NAXIS1", &width.to_string()));
    out.put_slice(&record("NAXIS2", &height.to_string()));
    out.put_slice(&record("NORDER", &order.to_string()));
    out.put_slice(&record("NPIX", &pixel.to_string()));

    let mut end = [b' '; RECORD_LEN];
    end[..3].copy_from_slice(b"END");
    out.put_slice(&end);

    while out.len() % HEADER_BLOCK != 0 {
        out.put_u8(b' ');
    }

    let (w, h) = (width as usize, height as usize);
    for y in (0..h).rev() {
        out.put_slice(&display[y * w..(y + 1) * w]);
    }

    out.freeze()
}

// =============================================================================
// Tests
// =============================================================================
