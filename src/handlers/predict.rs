//! Prediction handler

use axum::{extract::{rejection::JsonRejection, State}, Json};
use serde::Serialize;

use crate::{AppState, AppError, AppResult};
use crate::model::{inference, RawRecord};
use crate::models::{NewPrediction, PredictionRecord};

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: &'static str,
    pub confidence: f64,
    pub is_attack: bool,
}

/// Encode, classify and record one flow record.
///
/// Nothing is written unless encoding and inference both succeed.
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<RawRecord>, JsonRejection>,
) -> AppResult<Json<PredictResponse>> {
    let Json(record) = body.map_err(|e| {
        tracing::warn!("Rejected predict body: {}", e.body_text());
        AppError::from(e)
    })?;

    let models = state.models.as_deref().ok_or_else(|| {
        tracing::warn!("Predict called without a loaded model");
        AppError::ModelUnavailable
    })?;

    let verdict = inference::predict(models, &record).map_err(|e| {
        tracing::warn!("Prediction failed: {}", e);
        AppError::from(e)
    })?;

    let row = NewPrediction::from_request(&record, &verdict);
    let stored = PredictionRecord::record(&state.pool, row)
        .await
        .map_err(|e| AppError::StorageFailed(e.to_string()))?;

    tracing::info!(
        id = stored.id,
        "Recorded {} prediction ({:.2}%)",
        stored.prediction,
        stored.confidence
    );

    Ok(Json(PredictResponse {
        prediction: verdict.label.as_str(),
        confidence: stored.confidence,
        is_attack: verdict.label.is_attack(),
    }))
}
