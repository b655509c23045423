//! gauge-reader - analogue dial-gauge monitor
//!
//! # Usage
//!
//! ```bash
//! # Watch the current directory with built-in defaults
//! cargo run --release
//!
//! # Watch a camera drop folder, polling instead of OS notifications
//! ./gauge-reader --watch-dir /srv/camera --poll
//!
//! # Offline bench test: no work orders, annotated frame written to disk
//! ./gauge-reader --no-publish --display-image /tmp/gauge.png
//! ```
//!
//! Operator commands are read from stdin, one per line:
//! `clear`, `good`, `bad`, `threshold <x>`, `exit`.
//!
//! # Environment Variables
//!
//! - `GAUGE_CONFIG`: path to a TOML config file (default: `./gauge_config.toml`)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gauge_reader::alert::{self, AlertController};
use gauge_reader::config::{GaugeConfig, WatchMode};
use gauge_reader::display::{spawn_stdin_commands, HeadlessRenderer};
use gauge_reader::pipeline::TickLoop;
use gauge_reader::reader::GaugeReader;
use gauge_reader::watcher::{ArrivalWatcher, CanonicalSlot, DebounceMap, SharedState};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gauge-reader")]
#[command(about = "Analogue dial-gauge reader with threshold work orders")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides $GAUGE_CONFIG and ./gauge_config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory to watch for arriving images
    #[arg(long, value_name = "DIR")]
    watch_dir: Option<PathBuf>,

    /// Discover files by directory polling instead of OS notifications
    #[arg(long)]
    poll: bool,

    /// Never publish work orders
    #[arg(long)]
    no_publish: bool,

    /// Write each annotated frame to this image file
    #[arg(long, value_name = "PATH")]
    display_image: Option<PathBuf>,
}

fn load_config(args: &CliArgs) -> Result<GaugeConfig> {
    let mut config = match &args.config {
        Some(path) => match GaugeConfig::load_from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded gauge config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load --config, falling back");
                GaugeConfig::load()
            }
        },
        None => GaugeConfig::load(),
    };

    if let Some(dir) = &args.watch_dir {
        config.watch.dir = dir.clone();
    }
    if args.poll {
        config.watch.mode = WatchMode::Poll;
    }
    if args.no_publish {
        config.publish.enabled = false;
    }
    if let Some(path) = &args.display_image {
        config.storage.display_image = Some(path.clone());
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut config = load_config(&args)?;

    std::fs::create_dir_all(&config.storage.archive_dir).with_context(|| {
        format!("creating archive directory {}", config.storage.archive_dir.display())
    })?;

    config.watch.dir = std::fs::canonicalize(&config.watch.dir)
        .with_context(|| format!("watch directory {} not accessible", config.watch.dir.display()))?;
    let shared = Arc::new(SharedState::new(
        CanonicalSlot::new(config.watch.canonical_path()),
        DebounceMap::new(config.watch.debounce_window()),
    ));

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Analogue Gauge Reader");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        dir = %config.watch.dir.display(),
        canonical = %config.watch.canonical_name,
        archive = %config.storage.archive_dir.display(),
        "Watching"
    );
    info!(
        min_angle = config.calibration.min_angle,
        max_angle = config.calibration.max_angle,
        min_value = config.calibration.min_value,
        max_value = config.calibration.max_value,
        "Calibration"
    );
    info!(
        sanity_min = config.alert.sanity_min,
        sanity_max = config.alert.sanity_max,
        threshold = config.alert.default_threshold,
        "Alert band"
    );

    let publisher = alert::publisher::from_config(&config.publish)
        .context("building work-order publisher")?;
    if publisher.is_available() {
        info!(endpoint = %config.publish.endpoint, topic = %config.publish.topic, "Work orders enabled");
    } else {
        info!("Work orders disabled");
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let watcher = ArrivalWatcher::new(&config.watch, Arc::clone(&shared))
        .context("starting arrival watcher")?;
    let source = watcher
        .open_source(config.watch.mode, config.watch.poll_interval())
        .context("opening filesystem event source")?;
    let watcher_handle = tokio::spawn(watcher.run(source, cancel_token.clone()));

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    spawn_stdin_commands(cmd_tx).context("starting operator input thread")?;

    let controller = AlertController::new(&config.alert, &config.publish, publisher);
    let tick_loop = TickLoop::new(
        GaugeReader::new(&config),
        controller,
        HeadlessRenderer::new(config.storage.display_image.clone()),
        shared,
        cmd_rx,
        config.alert.tick_interval(),
        cancel_token.clone(),
    );
    tick_loop.run().await;

    cancel_token.cancel();
    if let Err(e) = watcher_handle.await {
        warn!(error = %e, "Arrival watcher task ended abnormally");
    }

    info!("✓ Gauge reader shutdown complete");
    Ok(())
}
