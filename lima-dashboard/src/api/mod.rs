//! HTTP surface of the dashboard
//!
//! JSON endpoints over the synchronization engine plus an SSE stream of
//! dashboard events (alerts, load progress, subscription errors).

pub mod health;
pub mod session;
pub mod sse;
pub mod submissions;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::SyncError;
use crate::subscription::{DashboardEngine, SessionSignal};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DashboardEngine>,
    /// Feeds the engine's session watcher (authenticator stand-in)
    pub session_tx: Arc<watch::Sender<SessionSignal>>,
    /// Cancelled on server shutdown; ends open event streams
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Arc<DashboardEngine>, session_tx: watch::Sender<SessionSignal>) -> Self {
        Self {
            engine,
            session_tx: Arc::new(session_tx),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(session::status))
        .route("/api/session", post(session::set_session))
        .route("/api/refresh", post(session::refresh))
        .route(
            "/api/submissions",
            get(submissions::list_submissions).post(submissions::create_submission),
        )
        .route("/api/submissions/:id", get(submissions::get_submission))
        .route("/api/submissions/:id/archive", post(submissions::archive_submission))
        .route("/api/history", get(submissions::history))
        .route("/events", get(sse::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No session is signed in (409)
    #[error("No active session")]
    NoSession,

    /// Store cannot serve the query as configured (503)
    #[error("{0}")]
    Configuration(String),

    /// Store failure (502)
    #[error("{0}")]
    Upstream(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotFound(id) => ApiError::NotFound(id),
            SyncError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SyncError::NoSession => ApiError::NoSession,
            SyncError::Configuration(_) => ApiError::Configuration(err.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NoSession => (StatusCode::CONFLICT, "NO_SESSION"),
            ApiError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_ERROR"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "STORE_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
