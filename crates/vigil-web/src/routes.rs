use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Redirect;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use vigil_core::{DetectionLog, LogEntry, LogError};

use crate::error::HttpError;

/// Shared handler state. The log manager is stateless over the filesystem,
/// so one instance serves every request.
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<DetectionLog>,
    pub static_root: PathBuf,
    pub alert_category: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", axum::routing::get(dashboard))
        .route("/api/dashboard", axum::routing::get(dashboard))
        .route("/api/log/clear-all", axum::routing::post(clear_all))
        .route("/api/log/clear-latest", axum::routing::post(clear_latest))
        .route("/download", axum::routing::get(download_log))
        .route("/health/live", axum::routing::get(health_live))
        .nest_service("/images", ServeDir::new(state.static_root.clone()))
        .with_state(state)
}

/// Aggregate dashboard payload: full history oldest first, the most recent
/// detection, and per-day counts for the activity chart.
#[derive(Debug, Serialize)]
struct DashboardData {
    detections: Vec<LogEntry>,
    latest: Option<LogEntry>,
    latest_is_alert: bool,
    chart: ChartData,
}

#[derive(Debug, Serialize)]
struct ChartData {
    labels: Vec<String>,
    values: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    message: String,
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardData>, HttpError> {
    let log = Arc::clone(&state.log);
    let entries = match tokio::task::spawn_blocking(move || log.read_all())
        .await
        .map_err(|err| HttpError::Internal(err.into()))?
    {
        Ok(entries) => entries,
        // A missing log just means nothing has been detected yet.
        Err(LogError::NotFound) => {
            warn!("detection log not found, serving empty dashboard");
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };

    let mut daily: BTreeMap<String, u64> = BTreeMap::new();
    for entry in &entries {
        let day = entry.timestamp.format("%Y-%m-%d").to_string();
        *daily.entry(day).or_insert(0) += 1;
    }
    let (labels, values): (Vec<String>, Vec<u64>) = daily.into_iter().unzip();

    let latest = entries.last().cloned();
    let latest_is_alert = latest
        .as_ref()
        .is_some_and(|entry| entry.category.eq_ignore_ascii_case(&state.alert_category));

    Ok(Json(DashboardData {
        detections: entries,
        latest,
        latest_is_alert,
        chart: ChartData { labels, values },
    }))
}

async fn clear_all(State(state): State<AppState>) -> Result<Redirect, HttpError> {
    let log = Arc::clone(&state.log);
    let summary = tokio::task::spawn_blocking(move || log.clear_all())
        .await
        .map_err(|err| HttpError::Internal(err.into()))??;
    info!(
        backup = %summary.backup_path.display(),
        images_removed = summary.images_removed,
        "detection log cleared"
    );
    Ok(Redirect::to("/"))
}

async fn clear_latest(State(state): State<AppState>) -> Result<Json<StatusBody>, HttpError> {
    let log = Arc::clone(&state.log);
    let removed = tokio::task::spawn_blocking(move || log.clear_latest())
        .await
        .map_err(|err| HttpError::Internal(err.into()))??;
    info!(
        line = %removed.line,
        image_removed = removed.image_removed,
        "latest detection cleared"
    );
    Ok(Json(StatusBody {
        status: "success",
        message: "Latest detection cleared.".to_string(),
    }))
}

async fn download_log(State(state): State<AppState>) -> Result<(HeaderMap, Vec<u8>), HttpError> {
    let content = match tokio::fs::read(state.log.log_path()).await {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(HttpError::NotFound(
                "detection log file not found".to_string(),
            ))
        }
        Err(err) => return Err(HttpError::Internal(err.into())),
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"detection_log.csv\""),
    );
    Ok((headers, content))
}

async fn health_live() -> StatusCode {
    StatusCode::OK
}
