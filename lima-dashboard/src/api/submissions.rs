//! Record endpoints: live view, detail, history and write actions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::display::RecordSummary;
use crate::model::{NewRecord, Record, ViewFilter};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionListResponse {
    is_synchronizing: bool,
    count: usize,
    submissions: Vec<RecordSummary>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetailResponse {
    summary: RecordSummary,
    record: Record,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    id: String,
}

/// GET /api/submissions?type=&status=
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SubmissionListResponse>> {
    let criteria = ViewFilter::parse(query.kind.as_deref(), query.status.as_deref())?;
    let records = state.engine.filtered(&criteria).await;
    let submissions = state.engine.summarize(&records).await;
    Ok(Json(SubmissionListResponse {
        is_synchronizing: state.engine.status().await.is_synchronizing,
        count: submissions.len(),
        submissions,
    }))
}

/// GET /api/submissions/:id - detail; opening a pending record marks it viewed
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SubmissionDetailResponse>> {
    let record = state.engine.open_record(&id).await?;
    let summary = state
        .engine
        .summarize(std::slice::from_ref(&record))
        .await
        .pop()
        .unwrap_or_else(|| RecordSummary::new(&record, None));
    Ok(Json(SubmissionDetailResponse { summary, record }))
}

/// POST /api/submissions/:id/archive
pub async fn archive_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.archive(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/submissions
pub async fn create_submission(
    State(state): State<AppState>,
    Json(draft): Json<NewRecord>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = state.engine.create_record(draft).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /api/history - archived partition, newest first
pub async fn history(State(state): State<AppState>) -> ApiResult<Json<Vec<RecordSummary>>> {
    let records = state.engine.load_history().await?;
    Ok(Json(state.engine.summarize(&records).await))
}
