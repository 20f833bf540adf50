use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use innkeep_core::repository::BookingRepository;
use innkeep_core::PersistenceError;
use innkeep_shared::{BookingEvent, HotelActivityBooking, HotelRoomBooking, StoredBooking};

use crate::database::{read_error, write_error};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct HotelRoomRow {
    hotel_id: String,
    customer_id: String,
    room_id: String,
    room_type: String,
    num_of_people: i32,
    check_in_date: String,
    check_out_date: String,
    booking_timestamp: String,
    trace_id: String,
}

impl TryFrom<HotelRoomRow> for HotelRoomBooking {
    type Error = PersistenceError;

    fn try_from(row: HotelRoomRow) -> Result<Self, Self::Error> {
        Ok(HotelRoomBooking {
            num_of_people: people(row.num_of_people, &row.trace_id)?,
            hotel_id: row.hotel_id,
            customer_id: row.customer_id,
            room_id: row.room_id,
            room_type: row.room_type,
            check_in_date: row.check_in_date,
            check_out_date: row.check_out_date,
            timestamp: row.booking_timestamp,
            trace_id: row.trace_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HotelActivityRow {
    hotel_id: String,
    customer_id: String,
    activity_id: String,
    activity_name: String,
    num_of_people: i32,
    reservation_date: String,
    booking_timestamp: String,
    trace_id: String,
}

impl TryFrom<HotelActivityRow> for HotelActivityBooking {
    type Error = PersistenceError;

    fn try_from(row: HotelActivityRow) -> Result<Self, Self::Error> {
        Ok(HotelActivityBooking {
            num_of_people: people(row.num_of_people, &row.trace_id)?,
            hotel_id: row.hotel_id,
            customer_id: row.customer_id,
            activity_id: row.activity_id,
            activity_name: row.activity_name,
            reservation_date: row.reservation_date,
            timestamp: row.booking_timestamp,
            trace_id: row.trace_id,
        })
    }
}

fn people(value: i32, trace_id: &str) -> Result<u32, PersistenceError> {
    u32::try_from(value)
        .map_err(|_| PersistenceError::InvalidRow(format!("negative num_of_people for {}", trace_id)))
}

fn column_people(value: u32) -> Result<i32, PersistenceError> {
    i32::try_from(value).map_err(|_| PersistenceError::Rejected(format!("num_of_people {} out of range", value)))
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(&self, booking: &StoredBooking) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        match &booking.event {
            BookingEvent::HotelRoom(b) => {
                sqlx::query(
                    r#"
                    INSERT INTO hotel_room (hotel_id, customer_id, room_id, room_type, num_of_people,
                                            check_in_date, check_out_date, booking_timestamp, date_created, trace_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(&b.hotel_id)
                .bind(&b.customer_id)
                .bind(&b.room_id)
                .bind(&b.room_type)
                .bind(column_people(b.num_of_people)?)
                .bind(&b.check_in_date)
                .bind(&b.check_out_date)
                .bind(&b.timestamp)
                .bind(booking.date_created)
                .bind(&b.trace_id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            }
            BookingEvent::HotelActivity(b) => {
                sqlx::query(
                    r#"
                    INSERT INTO hotel_activity (hotel_id, customer_id, activity_id, activity_name, num_of_people,
                                                reservation_date, booking_timestamp, date_created, trace_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(&b.hotel_id)
                .bind(&b.customer_id)
                .bind(&b.activity_id)
                .bind(&b.activity_name)
                .bind(column_people(b.num_of_people)?)
                .bind(&b.reservation_date)
                .bind(&b.timestamp)
                .bind(booking.date_created)
                .bind(&b.trace_id)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            }
        }

        tx.commit().await.map_err(write_error)?;
        Ok(())
    }

    async fn rooms_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, PersistenceError> {
        let rows: Vec<HotelRoomRow> = sqlx::query_as(
            r#"
            SELECT hotel_id, customer_id, room_id, room_type, num_of_people,
                   check_in_date, check_out_date, booking_timestamp, trace_id
            FROM hotel_room
            WHERE date_created >= $1 AND date_created < $2
            ORDER BY date_created, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        rows.into_iter().map(HotelRoomBooking::try_from).collect()
    }

    async fn activities_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, PersistenceError> {
        let rows: Vec<HotelActivityRow> = sqlx::query_as(
            r#"
            SELECT hotel_id, customer_id, activity_id, activity_name, num_of_people,
                   reservation_date, booking_timestamp, trace_id
            FROM hotel_activity
            WHERE date_created >= $1 AND date_created < $2
            ORDER BY date_created, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        rows.into_iter().map(HotelActivityBooking::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_people_is_an_invalid_row() {
        let row = HotelRoomRow {
            hotel_id: "H1".to_string(),
            customer_id: "C1".to_string(),
            room_id: "R1".to_string(),
            room_type: "single".to_string(),
            num_of_people: -1,
            check_in_date: "2024-04-01".to_string(),
            check_out_date: "2024-04-02".to_string(),
            booking_timestamp: "2024-03-01T12:00:00.000Z".to_string(),
            trace_id: "t-1".to_string(),
        };
        assert!(matches!(HotelRoomBooking::try_from(row), Err(PersistenceError::InvalidRow(_))));
    }

    #[test]
    fn test_activity_row_maps_booking_timestamp() {
        let row = HotelActivityRow {
            hotel_id: "H1".to_string(),
            customer_id: "C1".to_string(),
            activity_id: "A1".to_string(),
            activity_name: "spa".to_string(),
            num_of_people: 3,
            reservation_date: "2024-04-01".to_string(),
            booking_timestamp: "2024-03-01T12:00:00.000Z".to_string(),
            trace_id: "t-2".to_string(),
        };
        let booking = HotelActivityBooking::try_from(row).unwrap();
        assert_eq!(booking.num_of_people, 3);
        assert_eq!(booking.timestamp, "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_head_count_beyond_integer_column_is_rejected() {
        assert_eq!(column_people(i32::MAX as u32).unwrap(), i32::MAX);
        assert!(matches!(column_people(3_000_000_000), Err(PersistenceError::Rejected(_))));
    }
}
