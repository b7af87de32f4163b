use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vigil_core::{WatchConfig, WatchEngine};

mod source;

use source::ObservationSource;

#[derive(Parser)]
#[command(name = "vigild", version, about = "Vigil face-watch daemon")]
struct Args {
    /// Path to the TOML config file (default: ./vigil.toml or $VIGIL_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Replay a recorded observation stream instead of spawning the detector
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = WatchConfig::load(&WatchConfig::resolve_path(args.config))?;

    let directory = config.directory();
    let dispatcher = config.dispatcher();
    tracing::info!(
        profiles = directory.len(),
        threshold = config.confidence_threshold,
        channels = dispatcher.channel_count(),
        "vigild starting"
    );

    let mut engine = WatchEngine::new(
        directory,
        config.detection_log(),
        dispatcher,
        config.confidence_threshold,
    );

    let mut source = match &args.replay {
        Some(path) => ObservationSource::replay(path).await?,
        None => ObservationSource::spawn_detector(&config.detector_command)?,
    };
    tracing::info!("vigild ready");

    loop {
        tokio::select! {
            event = source.recv() => match event {
                Some(event) => engine.process(event),
                None => {
                    tracing::info!("observation stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    tracing::info!(frames = engine.frames_processed(), "vigild shutting down");
    Ok(())
}
