//! Session and engine status endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;

use super::{ApiResult, AppState};
use crate::subscription::{EngineStatus, SessionSignal};

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// `null` signs the dashboard out
    session_id: Option<String>,
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}

/// POST /api/session - publish a new session identity
///
/// The engine picks the change up asynchronously; poll `/api/status` or
/// watch `/events` for the outcome.
pub async fn set_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> StatusCode {
    let signal = match request.session_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => SessionSignal::signed_in(id),
        None => SessionSignal::signed_out(),
    };
    info!("Session signal: {:?}", signal.session_id);
    state.session_tx.send_replace(signal);
    StatusCode::ACCEPTED
}

/// POST /api/refresh - reopen the subscription after a failure
pub async fn refresh(State(state): State<AppState>) -> ApiResult<Json<EngineStatus>> {
    state.engine.refresh().await?;
    Ok(Json(state.engine.status().await))
}
