//! JSON error responses

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use wagw_core::SendError;

/// Error returned by a handler, rendered as `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or incomplete request body
    BadRequest(String),
    /// Outbound send failed
    Send(SendError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Send(SendError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            ApiError::Send(SendError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Send(SendError::DeliveryFailed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Send(err) => err.to_string(),
        }
    }
}

impl From<SendError> for ApiError {
    fn from(err: SendError) -> Self {
        ApiError::Send(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::warn!("Request failed with {}: {}", status, message);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, message);
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
