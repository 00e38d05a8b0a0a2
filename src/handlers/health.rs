//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    message: &'static str,
    model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_sha256: Option<String>,
    /// Where the artifacts are expected, shown while degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    model_dir: Option<String>,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.models.as_deref();

    Json(HealthResponse {
        status: "running",
        message: "Sentinel IDS Backend Active",
        model_loaded: model.is_some(),
        model_sha256: model.and_then(|m| m.fingerprint()).map(str::to_string),
        model_dir: model
            .is_none()
            .then(|| state.config.model_dir.display().to_string()),
    })
}
