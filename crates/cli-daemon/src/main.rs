//! CLI entry point for the Snapcam daemon
//!
//! Parses command line arguments, loads settings, and starts the capture
//! daemon with its HTTP API.

use clap::Parser;
use env_logger::Env;
use snapcam::codec::ImageRsCodec;
use snapcam::video::StubVideoSource;
use snapcam::{run_server, Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Snapcam - periodic snapshot capture for video sources
#[derive(Parser, Debug)]
#[command(name = "snapcamd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Snapcam starting (image root: {}, listen: {})",
        config.storage.image_root.display(),
        config.server.listen_addr
    );

    let daemon = Arc::new(Daemon::new(
        config,
        Arc::new(StubVideoSource::default()),
        Arc::new(ImageRsCodec),
    ));
    daemon.start();

    if let Err(e) = run_server(daemon).await {
        log::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
