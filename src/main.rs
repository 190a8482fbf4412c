//! HiPS Streamer - command-line front end for the tile pipeline.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hips_streamer::{
    cache_path, Cli, Command, EvictionSweep, FetchConfig, HttpTileFetcher, Loader, PathConfig,
    Survey, SurveyContext, SweepConfig, TileArena, TileStatus,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch(config) => run_fetch(config).await,
        Command::Path(config) => run_path(config),
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let survey = Arc::new(Survey::new(config.survey_config()));
    let arena = Arc::new(TileArena::new(config.survey.clone()));
    let loader = Loader::new(survey.clone(), Arc::new(HttpTileFetcher::new()));

    info!("Survey: {}", survey.survey_id());
    info!("  Primary: {}", survey.base_url());
    for mirror in &config.mirrors {
        info!("  Mirror:  {}", mirror);
    }
    match survey.cache_root() {
        Some(root) => info!("  Cache:   {}", root.display()),
        None => info!("  Cache:   disabled"),
    }

    let tile = arena.get_or_create(config.order, config.pixel);
    info!("Loading tile {} ...", tile.key());

    match loader.load_now(&tile).await {
        Ok(()) => {}
        Err(e) => {
            error!("Load failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    debug_assert_eq!(tile.status().get(), TileStatus::Ready);
    let dims = tile.with_buffer(|b| (b.width(), b.height(), b.is_color()));
    if let Some((w, h, color)) = dims {
        info!(
            "Tile ready: {}x{} {}",
            w,
            h,
            if color { "color" } else { "grayscale" }
        );
    }
    if let Some(kind) = survey.payload_kind() {
        info!("Payload kind: {:?}", kind);
    }

    if config.write_back {
        // Reuse the eviction path so the cache file is produced exactly the
        // way a memory-pressure sweep would produce it.
        let sweep = EvictionSweep::new(arena, survey.clone(), SweepConfig::default());
        sweep.free(&tile).await;
        info!("Tile written back to cache");
    }

    match serde_json::to_string_pretty(&survey.counters().snapshot()) {
        Ok(json) => info!("Counters: {}", json),
        Err(e) => error!("Counter serialization failed: {}", e),
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Path Command
// =============================================================================

fn run_path(config: PathConfig) -> ExitCode {
    let relative = cache_path(&config.survey, config.order, config.pixel, config.format);
    let path = match config.cache_root {
        Some(root) => root.join(relative),
        None => relative,
    };
    println!("{}", path.display());
    ExitCode::SUCCESS
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "hips_streamer=debug,info"
    } else {
        "hips_streamer=info,warn"
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
