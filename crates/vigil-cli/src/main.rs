use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use uuid::Uuid;
use vigil_core::log::TIMESTAMP_FORMAT;
use vigil_core::profile::IdentityProfile;
use vigil_core::{AlertEvent, CaptureKind, ChannelError, IdentityId, LogError, WatchConfig};

/// Minimal JPEG stream (SOI + EOI markers) used as the test-alert snapshot.
const TEST_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

#[derive(Parser)]
#[command(name = "vigil", version, about = "Vigil face-watch operations CLI")]
struct Cli {
    /// Path to the TOML config file (default: ./vigil.toml or $VIGIL_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the most recent detections, newest first
    Recent {
        /// Maximum number of rows to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// List the configured watchlist profiles
    Profiles,
    /// Remove the most recent detection and its snapshot
    ClearLatest,
    /// Back up the log, then remove every detection and snapshot
    ClearAll {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Send a test alert through every configured channel
    TestAlert,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = WatchConfig::load(&WatchConfig::resolve_path(cli.config))?;

    match cli.command {
        Commands::Recent { limit } => recent(&config, limit),
        Commands::Profiles => {
            profiles(&config);
            Ok(())
        }
        Commands::ClearLatest => clear_latest(&config),
        Commands::ClearAll { yes } => clear_all(&config, yes),
        Commands::TestAlert => test_alert(&config).await,
    }
}

fn recent(config: &WatchConfig, limit: usize) -> Result<()> {
    let entries = match config.detection_log().read_all() {
        Ok(entries) => entries,
        Err(LogError::NotFound) => Vec::new(),
        Err(err) => return Err(err.into()),
    };
    if entries.is_empty() {
        println!("No detections recorded");
        return Ok(());
    }
    println!("{:<20} {:>5}  {:<12} IMAGE", "TIMESTAMP", "ID", "CATEGORY");
    for entry in entries.iter().rev().take(limit) {
        println!(
            "{:<20} {:>5}  {:<12} {}",
            entry.timestamp.format(TIMESTAMP_FORMAT),
            entry.identity,
            entry.category,
            entry.image_path
        );
    }
    Ok(())
}

fn profiles(config: &WatchConfig) {
    let directory = config.directory();
    if directory.is_empty() {
        println!("No profiles configured");
        return;
    }
    for profile in directory.iter_sorted() {
        let marker = if directory.is_alert(profile) { "  [alerts]" } else { "" };
        println!("{:>5}  {} ({}){}", profile.id, profile.name, profile.category, marker);
        for attr in &profile.attributes {
            println!("       {}: {}", attr.label, attr.value);
        }
    }
}

fn clear_latest(config: &WatchConfig) -> Result<()> {
    let removed = config
        .detection_log()
        .clear_latest()
        .context("failed to clear the latest detection")?;
    println!("Removed: {}", removed.line);
    if removed.image_removed {
        println!("Snapshot deleted");
    }
    Ok(())
}

fn clear_all(config: &WatchConfig, yes: bool) -> Result<()> {
    if !yes {
        print!("This removes every detection and snapshot (the log is backed up first). Continue? [y/N] ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }
    let summary = config
        .detection_log()
        .clear_all()
        .context("failed to clear the detection log")?;
    println!("Backup written to {}", summary.backup_path.display());
    println!("Removed {} snapshot(s)", summary.images_removed);
    Ok(())
}

/// Exercise each notification channel with a synthetic alert so an operator
/// can verify credentials and hardware before going live.
async fn test_alert(config: &WatchConfig) -> Result<()> {
    let snapshot = config
        .detection_log()
        .save_snapshot(TEST_JPEG, CaptureKind::Manual)
        .context("failed to write the test snapshot")?;

    let event = AlertEvent {
        alert_id: Uuid::new_v4(),
        profile: IdentityProfile {
            id: IdentityId(0),
            name: "Test Subject".to_string(),
            category: config.alert_category.clone(),
            attributes: Vec::new(),
        },
        similarity: 100,
        detected_at: Local::now().naive_local(),
        image_name: snapshot.file_name.clone(),
        image_path: snapshot.disk_path.clone(),
    };

    let channels = config.channels();
    println!("Dispatching a test alert through {} channel(s)", channels.len());
    for channel in channels {
        match channel.deliver(&event).await {
            Ok(()) => println!("  {:<8} ok", channel.name()),
            Err(ChannelError::Unavailable(what)) => {
                println!("  {:<8} skipped: missing {what}", channel.name())
            }
            Err(err) => println!("  {:<8} failed: {err}", channel.name()),
        }
    }
    Ok(())
}
