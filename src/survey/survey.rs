//! Concrete survey description and context implementation.
//!
//! [`SurveyConfig`] is the serde-deserializable description of one HiPS
//! survey (identifier, primary and mirror sites, wire format, display cut
//! range, cache root); [`Survey`] wraps it with the runtime state the
//! pipeline needs - memoized payload classification, mirror rotation,
//! interaction flag, and load counters.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::format::PayloadKind;
use crate::tile::key::TileExt;
use crate::tile::node::Tile;

use super::context::{LoadCounters, SurveyContext};

fn default_pixel_min() -> f64 {
    0.0
}

fn default_pixel_max() -> f64 {
    255.0
}

// =============================================================================
// Survey Config
// =============================================================================

/// Static description of one survey, typically loaded from a JSON file.
///
/// ```json
/// {
///   "id": "DSS2-color",
///   "base_url": "https://alasky.example.org/DSS2-color",
///   "mirrors": ["https://mirror.example.org/DSS2-color"],
///   "format": "jpg",
///   "cache_root": "/var/cache/hips"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Survey identifier; also the directory name under the cache root.
    pub id: String,

    /// Primary survey server base URL.
    pub base_url: String,

    /// Alternate sites tried (one retry each) after a connection error.
    #[serde(default)]
    pub mirrors: Vec<String>,

    /// Wire format of the survey's tiles.
    pub format: TileExt,

    /// Root directory for the on-disk cache; `None` disables caching.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// Lower display cut for raw-numeric rescale.
    #[serde(default = "default_pixel_min")]
    pub pixel_min: f64,

    /// Upper display cut for raw-numeric rescale.
    #[serde(default = "default_pixel_max")]
    pub pixel_max: f64,
}

// =============================================================================
// Survey
// =============================================================================

/// Callback type used to request repaints from the view layer.
pub type RepaintFn = dyn Fn(&Tile) + Send + Sync;

/// A configured survey with its runtime pipeline state.
pub struct Survey {
    config: SurveyConfig,
    resolved_kind: OnceLock<PayloadKind>,
    mirror_cursor: AtomicUsize,
    interactive: AtomicBool,
    counters: LoadCounters,
    repaint: Option<Box<RepaintFn>>,
}

impl Survey {
    /// Create a survey from its configuration.
    pub fn new(config: SurveyConfig) -> Self {
        Self {
            config,
            resolved_kind: OnceLock::new(),
            mirror_cursor: AtomicUsize::new(0),
            interactive: AtomicBool::new(false),
            counters: LoadCounters::new(),
            repaint: None,
        }
    }

    /// Parse a survey from its JSON description.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Install the repaint callback invoked on tile completion.
    pub fn with_repaint(mut self, repaint: impl Fn(&Tile) + Send + Sync + 'static) -> Self {
        self.repaint = Some(Box::new(repaint));
        self
    }

    /// The static configuration.
    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    /// Flag the view as interactively panning (or not); while set, fetches
    /// use the small chunk size so abandoned tiles abort quickly.
    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::Release);
    }
}

impl SurveyContext for Survey {
    fn survey_id(&self) -> &str {
        &self.config.id
    }

    fn cache_root(&self) -> Option<PathBuf> {
        self.config.cache_root.clone()
    }

    fn caching_enabled(&self) -> bool {
        self.config.cache_root.is_some()
    }

    fn base_url(&self) -> String {
        self.config.base_url.clone()
    }

    fn pick_mirror(&self, previous_failed: bool) -> Option<Url> {
        if self.config.mirrors.is_empty() {
            return None;
        }
        let cursor = if previous_failed {
            self.mirror_cursor.fetch_add(1, Ordering::AcqRel)
        } else {
            self.mirror_cursor.load(Ordering::Acquire)
        };
        let raw = &self.config.mirrors[cursor % self.config.mirrors.len()];
        let mut base = raw.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).ok()
    }

    fn tile_extension(&self) -> TileExt {
        self.config.format
    }

    fn payload_kind(&self) -> Option<PayloadKind> {
        self.resolved_kind.get().copied()
    }

    fn resolve_payload_kind(&self, kind: PayloadKind) -> PayloadKind {
        let resolved = *self.resolved_kind.get_or_init(|| {
            debug!(survey = %self.config.id, ?kind, "payload kind resolved");
            kind
        });
        resolved
    }

    fn pixel_range(&self) -> (f64, f64) {
        (self.config.pixel_min, self.config.pixel_max)
    }

    fn interactive(&self) -> bool {
        self.interactive.load(Ordering::Acquire)
    }

    fn on_tile_ready(&self, tile: &Tile) {
        if let Some(repaint) = &self.repaint {
            repaint(tile);
        }
    }

    fn on_tile_error(&self, tile: &Tile) {
        if let Some(repaint) = &self.repaint {
            repaint(tile);
        }
    }

    fn counters(&self) -> &LoadCounters {
        &self.counters
    }
}

// =============================================================================
// Tests
// =============================================================================
