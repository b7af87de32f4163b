use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vigil_core::LogError;

/// Failures surfaced by the dashboard endpoints.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Forbidden(_) => StatusCode::FORBIDDEN,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LogError> for HttpError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::NotFound => HttpError::NotFound(err.to_string()),
            LogError::NoData | LogError::Malformed { .. } => HttpError::BadRequest(err.to_string()),
            LogError::PermissionDenied(_) => HttpError::Forbidden(err.to_string()),
            LogError::Io(_) => HttpError::Internal(err.into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            status: "error",
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
