use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width of every text column a booking is stored in.
pub const MAX_FIELD_LEN: usize = 250;
/// Largest head count an `INTEGER` column holds.
pub const MAX_PEOPLE: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    HotelRoom,
    HotelActivity,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::HotelRoom => "hotel_room",
            BookingKind::HotelActivity => "hotel_activity",
        }
    }
}

impl std::fmt::Display for BookingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hotel room reservation as published on the `events` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelRoomBooking {
    pub hotel_id: String,
    pub customer_id: String,
    pub room_id: String,
    pub room_type: String,
    pub num_of_people: u32,
    pub check_in_date: String,
    pub check_out_date: String,
    pub timestamp: String,
    pub trace_id: String,
}

/// A hotel activity reservation as published on the `events` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelActivityBooking {
    pub hotel_id: String,
    pub customer_id: String,
    pub activity_id: String,
    pub activity_name: String,
    pub num_of_people: u32,
    pub reservation_date: String,
    pub timestamp: String,
    pub trace_id: String,
}

// Ingress bodies carry everything except the trace id, which the gateway assigns.

#[derive(Debug, Clone, Deserialize)]
pub struct NewHotelRoomBooking {
    pub hotel_id: String,
    pub customer_id: String,
    pub room_id: String,
    pub room_type: String,
    pub num_of_people: u32,
    pub check_in_date: String,
    pub check_out_date: String,
    pub timestamp: String,
}

impl NewHotelRoomBooking {
    pub fn with_trace_id(self, trace_id: Uuid) -> HotelRoomBooking {
        HotelRoomBooking {
            hotel_id: self.hotel_id,
            customer_id: self.customer_id,
            room_id: self.room_id,
            room_type: self.room_type,
            num_of_people: self.num_of_people,
            check_in_date: self.check_in_date,
            check_out_date: self.check_out_date,
            timestamp: self.timestamp,
            trace_id: trace_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHotelActivityBooking {
    pub hotel_id: String,
    pub customer_id: String,
    pub activity_id: String,
    pub activity_name: String,
    pub num_of_people: u32,
    pub reservation_date: String,
    pub timestamp: String,
}

impl NewHotelActivityBooking {
    pub fn with_trace_id(self, trace_id: Uuid) -> HotelActivityBooking {
        HotelActivityBooking {
            hotel_id: self.hotel_id,
            customer_id: self.customer_id,
            activity_id: self.activity_id,
            activity_name: self.activity_name,
            num_of_people: self.num_of_people,
            reservation_date: self.reservation_date,
            timestamp: self.timestamp,
            trace_id: trace_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    HotelRoom(HotelRoomBooking),
    HotelActivity(HotelActivityBooking),
}

impl BookingEvent {
    pub fn kind(&self) -> BookingKind {
        match self {
            BookingEvent::HotelRoom(_) => BookingKind::HotelRoom,
            BookingEvent::HotelActivity(_) => BookingKind::HotelActivity,
        }
    }

    pub fn trace_id(&self) -> &str {
        match self {
            BookingEvent::HotelRoom(b) => &b.trace_id,
            BookingEvent::HotelActivity(b) => &b.trace_id,
        }
    }

    /// Checks the bounds of the relational columns the booking lands in.
    pub fn validate(&self) -> Result<(), String> {
        let (people, fields): (u32, Vec<(&str, &str)>) = match self {
            BookingEvent::HotelRoom(b) => (
                b.num_of_people,
                vec![
                    ("hotel_id", b.hotel_id.as_str()),
                    ("customer_id", b.customer_id.as_str()),
                    ("room_id", b.room_id.as_str()),
                    ("room_type", b.room_type.as_str()),
                    ("check_in_date", b.check_in_date.as_str()),
                    ("check_out_date", b.check_out_date.as_str()),
                    ("timestamp", b.timestamp.as_str()),
                    ("trace_id", b.trace_id.as_str()),
                ],
            ),
            BookingEvent::HotelActivity(b) => (
                b.num_of_people,
                vec![
                    ("hotel_id", b.hotel_id.as_str()),
                    ("customer_id", b.customer_id.as_str()),
                    ("activity_id", b.activity_id.as_str()),
                    ("activity_name", b.activity_name.as_str()),
                    ("reservation_date", b.reservation_date.as_str()),
                    ("timestamp", b.timestamp.as_str()),
                    ("trace_id", b.trace_id.as_str()),
                ],
            ),
        };

        if people > MAX_PEOPLE {
            return Err(format!("num_of_people {} exceeds {}", people, MAX_PEOPLE));
        }
        for (name, value) in fields {
            let len = value.chars().count();
            if len > MAX_FIELD_LEN {
                return Err(format!("{} is {} characters, limit is {}", name, len, MAX_FIELD_LEN));
            }
        }
        Ok(())
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            BookingEvent::HotelRoom(b) => serde_json::to_value(b),
            BookingEvent::HotelActivity(b) => serde_json::to_value(b),
        }
    }
}

/// Persisted copy of a booking. `date_created` is assigned by the storage
/// consumer and is the ordering key for aggregation windows.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBooking {
    pub event: BookingEvent,
    pub date_created: DateTime<Utc>,
}

impl StoredBooking {
    pub fn new(event: BookingEvent, date_created: DateTime<Utc>) -> Self {
        Self { event, date_created }
    }
}
