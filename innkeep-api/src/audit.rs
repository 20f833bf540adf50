use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use innkeep_core::audit::find_booking;
use innkeep_shared::BookingKind;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub index: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/audit/hotel-rooms", get(audit_room))
        .route("/audit/hotel-activities", get(audit_activity))
}

/// GET /audit/hotel-rooms?index=N
async fn audit_room(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    audit(&state, BookingKind::HotelRoom, query.index).await
}

/// GET /audit/hotel-activities?index=N
async fn audit_activity(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    audit(&state, BookingKind::HotelActivity, query.index).await
}

async fn audit(state: &AppState, kind: BookingKind, index: usize) -> Result<Json<serde_json::Value>, AppError> {
    let found = find_booking(state.archive.as_ref(), kind, index)
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    found
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("No {} booking at index {}", kind, index)))
}
