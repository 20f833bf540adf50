use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};

use innkeep_core::sink::event_code_counts;
use innkeep_core::NotFoundError;
use innkeep_shared::AggregateSnapshot;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/event-stats", get(get_event_stats))
}

/// GET /stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<AggregateSnapshot>, AppError> {
    let snapshot = state
        .stats
        .latest_snapshot()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    snapshot
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(NotFoundError::statistics().to_string()))
}

/// GET /event-stats
async fn get_event_stats(State(state): State<AppState>) -> Result<Json<BTreeMap<String, u64>>, AppError> {
    let counts = event_code_counts(state.event_log.as_ref())
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    counts
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(NotFoundError::statistics().to_string()))
}
