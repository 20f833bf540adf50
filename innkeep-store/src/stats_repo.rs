use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use innkeep_core::repository::StatsRepository;
use innkeep_core::PersistenceError;
use innkeep_shared::AggregateSnapshot;

use crate::database::{read_error, write_error};

pub struct PgStatsRepository {
    pool: PgPool,
}

impl PgStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    num_room_reservations: i64,
    max_room_people: i32,
    num_activity_reservations: i64,
    max_activity_people: i32,
    watermark: DateTime<Utc>,
}

impl TryFrom<StatsRow> for AggregateSnapshot {
    type Error = PersistenceError;

    fn try_from(row: StatsRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str| PersistenceError::InvalidRow(format!("negative {} in stats", field));
        Ok(AggregateSnapshot {
            num_room_reservations: u64::try_from(row.num_room_reservations)
                .map_err(|_| invalid("num_room_reservations"))?,
            max_room_people: u32::try_from(row.max_room_people).map_err(|_| invalid("max_room_people"))?,
            num_activity_reservations: u64::try_from(row.num_activity_reservations)
                .map_err(|_| invalid("num_activity_reservations"))?,
            max_activity_people: u32::try_from(row.max_activity_people)
                .map_err(|_| invalid("max_activity_people"))?,
            watermark: row.watermark,
        })
    }
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    async fn latest_snapshot(&self) -> Result<Option<AggregateSnapshot>, PersistenceError> {
        let row: Option<StatsRow> = sqlx::query_as(
            r#"
            SELECT num_room_reservations, max_room_people, num_activity_reservations,
                   max_activity_people, watermark
            FROM stats
            ORDER BY watermark DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;

        row.map(AggregateSnapshot::try_from).transpose()
    }

    async fn insert_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), PersistenceError> {
        let out_of_range = |field: &str| PersistenceError::Write(format!("{} exceeds column range", field));
        let num_rooms = i64::try_from(snapshot.num_room_reservations).map_err(|_| out_of_range("num_room_reservations"))?;
        let max_room = i32::try_from(snapshot.max_room_people).map_err(|_| out_of_range("max_room_people"))?;
        let num_activities =
            i64::try_from(snapshot.num_activity_reservations).map_err(|_| out_of_range("num_activity_reservations"))?;
        let max_activity = i32::try_from(snapshot.max_activity_people).map_err(|_| out_of_range("max_activity_people"))?;

        let mut tx = self.pool.begin().await.map_err(write_error)?;

        sqlx::query(
            r#"
            INSERT INTO stats (num_room_reservations, max_room_people, num_activity_reservations,
                               max_activity_people, watermark)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(num_rooms)
        .bind(max_room)
        .bind(num_activities)
        .bind(max_activity)
        .bind(snapshot.watermark)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        tx.commit().await.map_err(write_error)?;
        Ok(())
    }
}
