use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, warn};
use thiserror::Error;

use crate::types::ErrorBody;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Failed to reach upstream: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),
    #[error("Upstream returned {status}")]
    UpstreamStatus { status: StatusCode, body: String },
    #[error("Invalid upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamStatus { status, .. } => *status,
            RelayError::Multipart(e) => e.status(),
            RelayError::Io(_) | RelayError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            RelayError::UpstreamStatus { body, .. } if !body.is_empty() => body.clone(),
            RelayError::Io(_) => "Upload failed".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
