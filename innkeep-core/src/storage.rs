use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use innkeep_shared::{BookingEnvelope, BookingEvent, StoredBooking};

use crate::consumer::{HandleError, MessageHandler, Persisted};
use crate::error::DecodeError;
use crate::repository::BookingRepository;

pub fn decode_booking(payload: &[u8]) -> Result<BookingEvent, DecodeError> {
    let envelope: BookingEnvelope =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Envelope(e.to_string()))?;
    let event = envelope
        .into_event()
        .map_err(|e| DecodeError::Envelope(e.to_string()))?;
    event.validate().map_err(DecodeError::OutOfBounds)?;
    Ok(event)
}

/// Persists booking envelopes from the `events` topic. The creation
/// timestamp is assigned here, never taken from the payload.
pub struct BookingStorageHandler {
    bookings: Arc<dyn BookingRepository>,
}

impl BookingStorageHandler {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl MessageHandler for BookingStorageHandler {
    async fn handle(&self, payload: &[u8]) -> Result<Persisted, HandleError> {
        let event = decode_booking(payload)?;
        let description = format!("{} booking with trace id {}", event.kind(), event.trace_id());

        let stored = StoredBooking::new(event, Utc::now());
        self.bookings.insert_booking(&stored).await?;

        Ok(Persisted { description })
    }
}
