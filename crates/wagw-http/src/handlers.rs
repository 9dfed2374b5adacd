use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use wagw_core::{OutboundSendRequest, SessionState};

use crate::AppState;
use crate::error::ApiError;

/// `GET /`
///
/// `status` is `connected` or `disconnected`; `session` carries the detailed
/// session state (`unpaired`, `awaiting_scan`, `connected`, `disconnected`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub session: String,
    pub version: String,
}

/// `GET /qr`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    pub status: String,
}

/// `GET /status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub timestamp: DateTime<Utc>,
}

/// Successful `POST /send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    pub to: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendBody {
    #[serde(default)]
    number: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebhookSendBody {
    #[serde(default)]
    to: String,
    #[serde(default)]
    message: String,
}

pub(crate) async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let session = state.ctx.current_state();
    let status = if session == SessionState::Connected {
        "connected"
    } else {
        "disconnected"
    };
    Json(ServiceInfo {
        service: state.service.clone(),
        status: status.to_string(),
        session: session.to_string(),
        version: state.version.clone(),
    })
}

pub(crate) async fn qr(State(state): State<AppState>) -> Json<QrResponse> {
    let snap = state.ctx.snapshot();

    let response = if !snap.pairing_code.is_empty() {
        QrResponse {
            qr: Some(snap.pairing_code),
            status: "scan_needed".to_string(),
        }
    } else if snap.state == SessionState::Connected {
        QrResponse {
            qr: None,
            status: "connected".to_string(),
        }
    } else {
        QrResponse {
            qr: None,
            status: "disconnected".to_string(),
        }
    };
    Json(response)
}

pub(crate) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snap = state.ctx.snapshot();
    Json(StatusResponse {
        connected: snap.state == SessionState::Connected,
        has_qr: !snap.pairing_code.is_empty(),
        timestamp: Utc::now(),
    })
}

pub(crate) async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(body) = body?;
    if body.number.is_empty() || body.message.is_empty() {
        return Err(ApiError::BadRequest(
            "number and message are required".to_string(),
        ));
    }
    deliver(&state, OutboundSendRequest::new(body.number, body.message)).await
}

pub(crate) async fn send_alias(
    State(state): State<AppState>,
    body: Result<Json<WebhookSendBody>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(body) = body?;
    if body.to.is_empty() || body.message.is_empty() {
        return Err(ApiError::BadRequest(
            "to and message are required".to_string(),
        ));
    }
    deliver(&state, OutboundSendRequest::new(body.to, body.message)).await
}

async fn deliver(
    state: &AppState,
    request: OutboundSendRequest,
) -> Result<Json<SendResponse>, ApiError> {
    let ack = state.gateway.send(&request).await?;
    info!("Message sent to {}", ack.to);
    Ok(Json(SendResponse {
        success: true,
        to: ack.to,
        message_id: ack.message_id,
    }))
}
