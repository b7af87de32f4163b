use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use vigil_core::WatchConfig;

mod error;
mod routes;

use routes::AppState;

#[derive(Parser)]
#[command(name = "vigil-web", version, about = "Vigil detection dashboard server")]
struct Args {
    /// Path to the TOML config file (default: ./vigil.toml or $VIGIL_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Bind address override, e.g. 0.0.0.0:5000
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = WatchConfig::load(&WatchConfig::resolve_path(args.config))?;
    let bind_addr = args.bind.unwrap_or_else(|| config.bind_addr.clone());

    let state = AppState {
        log: Arc::new(config.detection_log()),
        static_root: PathBuf::from(&config.static_root),
        alert_category: config.alert_category.clone(),
    };
    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, log = %config.log_path, "vigil-web listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("vigil-web shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
