//! Series tracking API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use retrack_core::{BatchReport, ReconcileError, ReconcileOutcome, Series};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub url: String,
    /// User on whose behalf the series is tracked; defaults to the
    /// anonymous id 0.
    #[serde(default)]
    pub added_by: i64,
}

#[derive(Debug, Deserialize)]
pub struct UntrackParams {
    #[serde(default)]
    pub delete_files: bool,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    #[serde(flatten)]
    pub series: Series,
    /// Present when the initial payload sync failed; the series stays
    /// tracked and the next pass retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_sync_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeriesListResponse {
    pub series: Vec<Series>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: &ReconcileError) -> ApiError {
    let status = match e {
        ReconcileError::NotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::AlreadyTracked(_) => StatusCode::CONFLICT,
        ReconcileError::ResolveFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReconcileError::FetchFailed(_)
        | ReconcileError::DownloadFailed(_)
        | ReconcileError::AddFailed(_)
        | ReconcileError::DeleteFailed(_) => StatusCode::BAD_GATEWAY,
        ReconcileError::AllocationConflict => StatusCode::SERVICE_UNAVAILABLE,
        ReconcileError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            kind: e.kind().to_string(),
        }),
    )
}

/// POST /api/v1/series
///
/// Start tracking a release page.
pub async fn track(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrackRequest>,
) -> Result<(StatusCode, Json<TrackResponse>), ApiError> {
    let result = state
        .engine()
        .track(&request.url, request.added_by)
        .await
        .map_err(|e| error_response(&e))?;

    Ok((
        StatusCode::CREATED,
        Json(TrackResponse {
            series: result.series,
            initial_sync_error: result.initial_sync_error.map(|e| e.kind().to_string()),
        }),
    ))
}

/// GET /api/v1/series
///
/// List all tracked series.
pub async fn list_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesListResponse>, ApiError> {
    let series = state
        .engine()
        .list_series()
        .map_err(|e| error_response(&e))?;
    let count = series.len();
    Ok(Json(SeriesListResponse { series, count }))
}

/// GET /api/v1/series/{id}
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<Series>, ApiError> {
    state
        .engine()
        .get_series(id)
        .map_err(|e| error_response(&e))?
        .map(Json)
        .ok_or_else(|| error_response(&ReconcileError::NotFound(id)))
}

/// DELETE /api/v1/series/{id}
///
/// Stop tracking a series, removing its store entry first.
pub async fn untrack(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Query(params): Query<UntrackParams>,
) -> Result<StatusCode, ApiError> {
    state
        .engine()
        .untrack(id, params.delete_files)
        .await
        .map_err(|e| error_response(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/series/{id}/refresh
///
/// Reconcile one series right now, outside the scheduled pass.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    state
        .engine()
        .reconcile_by_id(id)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// POST /api/v1/reconcile
///
/// Run a full reconciliation pass over every tracked series.
pub async fn reconcile_all(State(state): State<Arc<AppState>>) -> Json<BatchReport> {
    Json(state.engine().reconcile_all().await)
}

/// POST /api/v1/store/clear
///
/// Remove every entry in the managed store category.
pub async fn clear_store(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state
        .engine()
        .clear_category()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(StatusCode::NO_CONTENT)
}
