//! HTTP error mapping.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::types::PlacementError;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable code for programmatic handling
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&PlacementError> for ApiError {
    fn from(err: &PlacementError) -> Self {
        let (_, api) = classify(err);
        api
    }
}

fn classify(err: &PlacementError) -> (StatusCode, ApiError) {
    if err.is_validation() {
        (
            StatusCode::BAD_REQUEST,
            ApiError::new("BAD_REQUEST", err.to_string()),
        )
    } else if err.is_upstream() {
        let details = match err {
            PlacementError::Detector { label, .. } => Some(format!("detector: {}", label)),
            PlacementError::Timeout { service, .. } => Some(format!("service: {}", service)),
            _ => None,
        };
        let api = ApiError::new("UPSTREAM_ERROR", err.to_string());
        (
            StatusCode::BAD_GATEWAY,
            match details {
                Some(d) => api.with_details(d),
                None => api,
            },
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", err.to_string()),
        )
    }
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// A collaborator the request needs is not configured.
    Unavailable(String),
    Internal(String),
    Placement(PlacementError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg)),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("SERVICE_UNAVAILABLE", msg),
            ),
            AppError::Internal(msg) => {
                error!(message = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("INTERNAL_ERROR", msg),
                )
            }
            AppError::Placement(e) => {
                let (status, body) = classify(&e);
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                }
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<PlacementError> for AppError {
    fn from(err: PlacementError) -> Self {
        AppError::Placement(err)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Malformed multipart body: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}
