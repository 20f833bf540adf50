pub mod models;
pub mod time;

pub use models::bookings::{
    BookingEvent, BookingKind, HotelActivityBooking, HotelRoomBooking, StoredBooking, MAX_FIELD_LEN, MAX_PEOPLE,
};
pub use models::events::{BookingEnvelope, LogMessage, LoggedEvent, MessageCode};
pub use models::stats::AggregateSnapshot;
