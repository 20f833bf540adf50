use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use innkeep_shared::models::bookings::{NewHotelActivityBooking, NewHotelRoomBooking};
use innkeep_shared::time::parse_timestamp;
use innkeep_shared::{BookingEvent, HotelActivityBooking, HotelRoomBooking};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub start_timestamp: String,
    pub end_timestamp: String,
}

impl WindowQuery {
    fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
        let parse = |raw: &str| {
            parse_timestamp(raw).map_err(|e| AppError::ValidationError(format!("Invalid timestamp '{}': {}", raw, e)))
        };
        Ok((parse(&self.start_timestamp)?, parse(&self.end_timestamp)?))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/booking/hotel-rooms", post(create_room_booking).get(list_room_bookings))
        .route(
            "/booking/hotel-activities",
            post(create_activity_booking).get(list_activity_bookings),
        )
}

// ============================================================================
// Ingress
// ============================================================================

/// POST /booking/hotel-rooms
async fn create_room_booking(
    State(state): State<AppState>,
    Json(req): Json<NewHotelRoomBooking>,
) -> Result<StatusCode, AppError> {
    publish(&state, BookingEvent::HotelRoom(req.with_trace_id(Uuid::new_v4()))).await
}

/// POST /booking/hotel-activities
async fn create_activity_booking(
    State(state): State<AppState>,
    Json(req): Json<NewHotelActivityBooking>,
) -> Result<StatusCode, AppError> {
    publish(&state, BookingEvent::HotelActivity(req.with_trace_id(Uuid::new_v4()))).await
}

async fn publish(state: &AppState, event: BookingEvent) -> Result<StatusCode, AppError> {
    info!("Received {} booking with trace id {}", event.kind(), event.trace_id());
    event.validate().map_err(AppError::ValidationError)?;

    state
        .publisher
        .publish_booking(&state.topics.events, &event)
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    Ok(StatusCode::CREATED)
}

// ============================================================================
// Window queries
// ============================================================================

/// GET /booking/hotel-rooms?start_timestamp=..&end_timestamp=..
async fn list_room_bookings(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<HotelRoomBooking>>, AppError> {
    let (start, end) = query.bounds()?;
    let rooms = state
        .bookings
        .rooms_between(start, end)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(rooms))
}

/// GET /booking/hotel-activities?start_timestamp=..&end_timestamp=..
async fn list_activity_bookings(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<HotelActivityBooking>>, AppError> {
    let (start, end) = query.bounds()?;
    let activities = state
        .bookings
        .activities_between(start, end)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(activities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_parse_millisecond_timestamps() {
        let query = WindowQuery {
            start_timestamp: "2024-03-01T12:00:00.000Z".to_string(),
            end_timestamp: "2024-03-01T12:00:05.250Z".to_string(),
        };
        let (start, end) = query.bounds().unwrap();
        assert_eq!((end - start).num_milliseconds(), 5250);
    }

    #[test]
    fn test_window_bounds_reject_garbage() {
        let query = WindowQuery {
            start_timestamp: "yesterday".to_string(),
            end_timestamp: "2024-03-01T12:00:00.000Z".to_string(),
        };
        assert!(matches!(query.bounds(), Err(AppError::ValidationError(_))));
    }
}
