use async_trait::async_trait;
use chrono::{DateTime, Utc};
use innkeep_shared::{AggregateSnapshot, HotelActivityBooking, HotelRoomBooking, LoggedEvent, StoredBooking};

use crate::error::{PersistenceError, UpstreamQueryError};

/// Repository trait for booking persistence and window queries
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Writes one booking inside a single transaction. Returning `Ok` means
    /// the transaction committed.
    async fn insert_booking(&self, booking: &StoredBooking) -> Result<(), PersistenceError>;

    /// Room bookings with `start <= date_created < end`.
    async fn rooms_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, PersistenceError>;

    /// Activity bookings with `start <= date_created < end`.
    async fn activities_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, PersistenceError>;
}

/// Repository trait for aggregate snapshots
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn latest_snapshot(&self) -> Result<Option<AggregateSnapshot>, PersistenceError>;

    async fn insert_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), PersistenceError>;
}

/// Repository trait for the flat control-event log
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn insert_event(&self, event: &LoggedEvent) -> Result<(), PersistenceError>;

    /// Row counts grouped by raw message code.
    async fn count_by_code(&self) -> Result<Vec<(String, i64)>, PersistenceError>;
}

/// The storage service as seen by the aggregator. Implementations must
/// bound their own I/O; the aggregator adds an outer timeout as well.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn room_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, UpstreamQueryError>;

    async fn activity_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, UpstreamQueryError>;
}
