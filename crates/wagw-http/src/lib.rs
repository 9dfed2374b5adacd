//! HTTP facade for the WhatsApp gateway
//!
//! | Method | Path       | Body                 | Response                                   |
//! |--------|------------|----------------------|--------------------------------------------|
//! | GET    | `/`        |                      | `{service, status, session, version}`      |
//! | GET    | `/qr`      |                      | `{qr, status}` or `{status}`               |
//! | GET    | `/status`  |                      | `{connected, hasQR, timestamp}`            |
//! | POST   | `/send`    | `{number, message}`  | `{success, to, messageId}` or `{error}`    |
//! | POST   | `/webhook` | `{to, message}`      | same as `/send`                            |
//!
//! Handlers only read the shared [`SessionContext`]; the engine is the sole
//! writer. Every failure becomes a JSON `{error}` body, never a panic.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{QrResponse, SendResponse, ServiceInfo, StatusResponse};

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use wagw_core::config::HttpConfig;
use wagw_core::{SendGateway, SessionContext};

/// Shared state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session state (read-only here)
    pub ctx: SessionContext,
    /// Outbound send path
    pub gateway: Arc<SendGateway>,
    /// Reported by `GET /`
    pub service: String,
    /// Reported by `GET /`
    pub version: String,
}

impl AppState {
    pub fn new(ctx: SessionContext, gateway: Arc<SendGateway>, http: &HttpConfig) -> Self {
        Self {
            ctx,
            gateway,
            service: http.service_name.clone(),
            version: http.version.clone(),
        }
    }
}

/// Build the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::service_info))
        .route("/qr", get(handlers::qr))
        .route("/status", get(handlers::status))
        .route("/send", post(handlers::send))
        .route("/webhook", post(handlers::send_alias))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
