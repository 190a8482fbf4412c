//! Configuration for the `hips-streamer` binary.
//!
//! The CLI exposes the pipeline end to end without any viewer attached:
//!
//! - `fetch` - load one tile through the full cache/network pipeline and
//!   report what happened
//! - `path` - print the deterministic cache path of a tile
//!
//! All options can also be set via environment variables with the `HIPS_`
//! prefix.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::survey::SurveyConfig;
use crate::tile::key::TileExt;

/// Default display cut range for raw-numeric surveys.
pub const DEFAULT_PIXEL_MIN: f64 = 0.0;
pub const DEFAULT_PIXEL_MAX: f64 = 255.0;

fn parse_ext(raw: &str) -> Result<TileExt, String> {
    match raw {
        "jpg" => Ok(TileExt::Jpg),
        "fits" => Ok(TileExt::Fits),
        other => Err(format!("unknown tile format {other:?} (expected jpg or fits)")),
    }
}

// =============================================================================
// CLI
// =============================================================================

/// HiPS Streamer - a tile cache and loader for HEALPix sky surveys.
#[derive(Parser, Debug, Clone)]
#[command(name = "hips-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load one tile through the full pipeline (cache, network, mirrors).
    Fetch(FetchConfig),

    /// Print the cache path of a tile.
    Path(PathConfig),
}

// =============================================================================
// Fetch Command
// =============================================================================

/// Options of the `fetch` subcommand.
#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    /// Survey identifier (directory name under the cache root).
    #[arg(long, env = "HIPS_SURVEY")]
    pub survey: String,

    /// Base URL of the primary survey server.
    #[arg(long, env = "HIPS_BASE_URL")]
    pub base_url: String,

    /// Mirror base URLs (comma-separated) tried after a connection error.
    #[arg(long, env = "HIPS_MIRRORS", value_delimiter = ',')]
    pub mirrors: Vec<String>,

    /// Wire format of the survey's tiles.
    #[arg(long, default_value = "jpg", value_parser = parse_ext, env = "HIPS_FORMAT")]
    pub format: TileExt,

    /// HEALPIX resolution order of the tile.
    #[arg(long)]
    pub order: u8,

    /// HEALPIX NESTED pixel index of the tile.
    #[arg(long)]
    pub pixel: u64,

    /// Cache root directory; omit to disable caching.
    #[arg(long, env = "HIPS_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Lower display cut for raw-numeric rescale.
    #[arg(long, default_value_t = DEFAULT_PIXEL_MIN)]
    pub pixel_min: f64,

    /// Upper display cut for raw-numeric rescale.
    #[arg(long, default_value_t = DEFAULT_PIXEL_MAX)]
    pub pixel_max: f64,

    /// Write the fetched tile back to the cache before exiting.
    #[arg(long, default_value_t = false)]
    pub write_back: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FetchConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.survey.is_empty() {
            return Err("survey id is required. Set --survey or HIPS_SURVEY".to_string());
        }
        if self.base_url.is_empty() {
            return Err("base URL is required. Set --base-url or HIPS_BASE_URL".to_string());
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!("base URL {:?} is not a valid URL", self.base_url));
        }
        if self.pixel_max <= self.pixel_min {
            return Err("pixel_max must be greater than pixel_min".to_string());
        }
        if self.order > 29 {
            return Err(format!("order {} exceeds the maximum of 29", self.order));
        }
        if self.pixel >= 12 * (1u64 << (2 * self.order as u32)) {
            return Err(format!(
                "pixel {} is out of range for order {} (max {})",
                self.pixel,
                self.order,
                12 * (1u64 << (2 * self.order as u32)) - 1
            ));
        }
        if self.write_back && self.cache_root.is_none() {
            return Err("--write-back requires --cache-root".to_string());
        }
        Ok(())
    }

    /// The survey description this fetch configures.
    pub fn survey_config(&self) -> SurveyConfig {
        SurveyConfig {
            id: self.survey.clone(),
            base_url: self.base_url.clone(),
            mirrors: self.mirrors.clone(),
            format: self.format,
            cache_root: self.cache_root.clone(),
            pixel_min: self.pixel_min,
            pixel_max: self.pixel_max,
        }
    }
}

// =============================================================================
// Path Command
// =============================================================================

/// Options of the `path` subcommand.
#[derive(Args, Debug, Clone)]
pub struct PathConfig {
    /// Survey identifier.
    #[arg(long, env = "HIPS_SURVEY")]
    pub survey: String,

    /// HEALPIX resolution order of the tile.
    #[arg(long)]
    pub order: u8,

    /// HEALPIX NESTED pixel index of the tile.
    #[arg(long)]
    pub pixel: u64,

    /// Wire format of the survey's tiles.
    #[arg(long, default_value = "jpg", value_parser = parse_ext, env = "HIPS_FORMAT")]
    pub format: TileExt,

    /// Cache root to prefix the relative path with.
    #[arg(long, env = "HIPS_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_config() -> FetchConfig {
        FetchConfig {
            survey: "DSS2-color".to_string(),
            base_url: "https://alasky.example.org/DSS2-color".to_string(),
            mirrors: vec![],
            format: TileExt::Jpg,
            order: 3,
            pixel: 17,
            cache_root: None,
            pixel_min: DEFAULT_PIXEL_MIN,
            pixel_max: DEFAULT_PIXEL_MAX,
            write_back: false,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(fetch_config().validate().is_ok());
    }

    #[test]
    fn test_empty_survey() {
        let mut config = fetch_config();
        config.survey = String::new();
        assert!(config.validate().unwrap_err().contains("survey"));
    }

    #[test]
    fn test_bad_base_url() {
        let mut config = fetch_config();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pixel_out_of_range() {
        let mut config = fetch_config();
        // Order 3 has 12 * 4^3 = 768 pixels.
        config.pixel = 768;
        assert!(config.validate().is_err());
        config.pixel = 767;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_order_out_of_range() {
        let mut config = fetch_config();
        config.order = 30;
        assert!(config.validate().is_err());
        config.order = 29;
        config.pixel = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_pixel_range() {
        let mut config = fetch_config();
        config.pixel_min = 100.0;
        config.pixel_max = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_back_needs_cache_root() {
        let mut config = fetch_config();
        config.write_back = true;
        assert!(config.validate().is_err());
        config.cache_root = Some("/tmp/cache".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_ext() {
        assert_eq!(parse_ext("jpg").unwrap(), TileExt::Jpg);
        assert_eq!(parse_ext("fits").unwrap(), TileExt::Fits);
        assert!(parse_ext("png").is_err());
    }

    #[test]
    fn test_survey_config_mapping() {
        let mut config = fetch_config();
        config.cache_root = Some("/var/cache/hips".into());
        let sc = config.survey_config();
        assert_eq!(sc.id, "DSS2-color");
        assert_eq!(sc.format, TileExt::Jpg);
        assert_eq!(sc.cache_root, Some(PathBuf::from("/var/cache/hips")));
    }
}
