use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bookings::{BookingEvent, BookingKind};

/// Wire wrapper for booking events on the `events` topic.
///
/// Older producers write the envelope time under `datetime`; both names are
/// accepted on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEnvelope {
    #[serde(rename = "type")]
    pub kind: BookingKind,
    #[serde(alias = "datetime")]
    pub timestamp: String,
    pub payload: serde_json::Value,
}

impl BookingEnvelope {
    pub fn wrap(event: &BookingEvent, at: &DateTime<Utc>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: event.kind(),
            timestamp: crate::time::format_timestamp(at),
            payload: event.payload()?,
        })
    }

    /// Decodes the payload according to the type tag. Fails if a required
    /// field is missing or has the wrong shape.
    pub fn into_event(self) -> Result<BookingEvent, serde_json::Error> {
        match self.kind {
            BookingKind::HotelRoom => serde_json::from_value(self.payload).map(BookingEvent::HotelRoom),
            BookingKind::HotelActivity => serde_json::from_value(self.payload).map(BookingEvent::HotelActivity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageCode {
    #[serde(rename = "0001")]
    StartedReceiver,
    #[serde(rename = "0002")]
    StartedStorage,
    #[serde(rename = "0003")]
    StartedProcessing,
    #[serde(rename = "0004")]
    ThresholdExceeded,
}

impl MessageCode {
    pub const ALL: [MessageCode; 4] = [
        MessageCode::StartedReceiver,
        MessageCode::StartedStorage,
        MessageCode::StartedProcessing,
        MessageCode::ThresholdExceeded,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            MessageCode::StartedReceiver => "0001",
            MessageCode::StartedStorage => "0002",
            MessageCode::StartedProcessing => "0003",
            MessageCode::ThresholdExceeded => "0004",
        }
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Control/diagnostic message published on the `event_log` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message_info: String,
    pub message_code: MessageCode,
}

impl LogMessage {
    pub fn new(message_code: MessageCode, message_info: impl Into<String>) -> Self {
        Self {
            message_info: message_info.into(),
            message_code,
        }
    }
}

/// A log message as persisted by the log sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub message_info: String,
    pub message_code: MessageCode,
    #[serde(with = "crate::time::iso_millis")]
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_legacy_room_envelope() {
        let raw = json!({
            "type": "hotel_room",
            "datetime": "2024-03-01T12:00:00",
            "payload": {
                "hotel_id": "H1",
                "customer_id": "C1",
                "room_id": "R12",
                "room_type": "suite",
                "num_of_people": 3,
                "check_in_date": "2024-04-01",
                "check_out_date": "2024-04-03",
                "timestamp": "2024-03-01T11:59:00.000Z",
                "trace_id": "t-1"
            }
        });

        let envelope: BookingEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.kind, BookingKind::HotelRoom);

        match envelope.into_event().unwrap() {
            BookingEvent::HotelRoom(room) => {
                assert_eq!(room.room_type, "suite");
                assert_eq!(room.num_of_people, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let raw = json!({
            "type": "hotel_activity",
            "timestamp": "2024-03-01T12:00:00.000Z",
            "payload": { "hotel_id": "H1", "customer_id": "C1" }
        });

        let envelope: BookingEnvelope = serde_json::from_value(raw).unwrap();
        assert!(envelope.into_event().is_err());
    }

    #[test]
    fn test_message_code_wire_values() {
        let msg = LogMessage::new(MessageCode::ThresholdExceeded, "too many");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["message_code"], "0004");
        let decoded: MessageCode = serde_json::from_value(json!("0002")).unwrap();
        assert_eq!(decoded, MessageCode::StartedStorage);
        assert!(serde_json::from_value::<MessageCode>(json!("0009")).is_err());
    }
}
