//! Shared helpers for the integration tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma, Rgb, RgbImage};
use url::Url;

use hips_streamer::{CancelProbe, FetchError, Survey, SurveyConfig, TileExt, TileFetcher};

/// Encode a deterministic grayscale JPEG tile.
pub fn gray_jpeg(side: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(side, side, |x, y| Luma([((x * 5 + y * 3) % 256) as u8]));
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Encode a deterministic color JPEG tile.
pub fn color_jpeg(side: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(side, side, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Build a 16-bit FITS tile payload with the given bottom-up sample rows.
pub fn fits_i16(width: u32, height: u32, values: &[i16], blank: Option<i64>) -> Vec<u8> {
    let mut records: Vec<(String, String)> = vec![
        ("SIMPLE".into(), "T".into()),
        ("BITPIX".into(), "16".into()),
        ("NAXIS".into(), "2".into()),
        ("NAXIS1".into(), width.to_string()),
        ("NAXIS2".into(), height.to_string()),
    ];
    if let Some(blank) = blank {
        records.push(("BLANK".into(), blank.to_string()));
    }

    let mut out = Vec::new();
    for (k, v) in &records {
        let text = format!("{k:<8}= {v:>20}");
        let mut record = [b' '; 80];
        record[..text.len()].copy_from_slice(text.as_bytes());
        out.extend_from_slice(&record);
    }
    let mut end = [b' '; 80];
    end[..3].copy_from_slice(b"END");
    out.extend_from_slice(&end);
    while out.len() % 2880 != 0 {
        out.push(b' ');
    }
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Scratch cache root under the system temp dir, removed on drop.
pub struct ScratchRoot(pub PathBuf);

impl ScratchRoot {
    pub fn new(tag: &str) -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!(
            "hips-streamer-it-{}-{}-{}",
            tag,
            std::process::id(),
            SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        ScratchRoot(path)
    }
}

impl Drop for ScratchRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Scripted tile fetcher keyed by host name.
pub struct MockFetcher {
    responses: HashMap<String, Result<Bytes, FetchError>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script the outcome for requests hitting `host`.
    pub fn with(mut self, host: &str, result: Result<Bytes, FetchError>) -> Self {
        self.responses.insert(host.to_string(), result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileFetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &Url,
        _chunk: usize,
        cancel: &dyn CancelProbe,
    ) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.cancelled() {
            return Err(FetchError::Cancelled);
        }
        let host = url.host_str().unwrap_or("").to_string();
        match self.responses.get(&host) {
            Some(result) => result.clone(),
            None => Err(FetchError::NotFound(url.to_string())),
        }
    }
}

/// A survey pointed at `primary.example.org` with optional mirror and cache.
pub fn test_survey(
    format: TileExt,
    cache_root: Option<PathBuf>,
    with_mirror: bool,
) -> Arc<Survey> {
    let mirrors = if with_mirror {
        vec!["https://mirror.example.org/s".to_string()]
    } else {
        vec![]
    };
    Arc::new(Survey::new(SurveyConfig {
        id: "it-survey".to_string(),
        base_url: "https://primary.example.org/s".to_string(),
        mirrors,
        format,
        cache_root,
        pixel_min: 0.0,
        pixel_max: 1000.0,
    }))
}
