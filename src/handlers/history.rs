//! Statistics and recent-history handlers

use axum::{extract::{rejection::QueryRejection, Query, State}, Json};
use serde::Deserialize;

use crate::{AppState, AppError, AppResult};
use crate::models::{PredictionRecord, PredictionStats, RECENT_LIMIT};

#[derive(Debug, Deserialize, Default)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// Aggregate counts over all recorded predictions
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<PredictionStats>> {
    let stats = PredictionRecord::aggregate(&state.pool).await?;
    Ok(Json(stats))
}

/// Up to 20 most recent predictions, newest first
pub async fn recent(
    State(state): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> AppResult<Json<Vec<PredictionRecord>>> {
    let Query(query) = query.map_err(AppError::from)?;
    let limit = query.limit.unwrap_or(RECENT_LIMIT);
    let records = PredictionRecord::recent(&state.pool, limit).await?;
    Ok(Json(records))
}
