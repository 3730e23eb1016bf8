use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use retrack_core::{EngineStatus, SanitizedConfig};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine().status().await)
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> String {
    crate::metrics::collect_dynamic_metrics(&state).await;
    crate::metrics::encode_metrics()
}
