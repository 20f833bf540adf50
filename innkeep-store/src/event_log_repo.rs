use async_trait::async_trait;
use sqlx::PgPool;

use innkeep_core::repository::EventLogRepository;
use innkeep_core::PersistenceError;
use innkeep_shared::LoggedEvent;

use crate::database::{read_error, write_error};

pub struct PgEventLogRepository {
    pool: PgPool,
}

impl PgEventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    async fn insert_event(&self, event: &LoggedEvent) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        sqlx::query("INSERT INTO event_log (message_info, message_code, logged_at) VALUES ($1, $2, $3)")
            .bind(&event.message_info)
            .bind(event.message_code.code())
            .bind(event.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await.map_err(write_error)?;
        Ok(())
    }

    async fn count_by_code(&self) -> Result<Vec<(String, i64)>, PersistenceError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT message_code, COUNT(*) AS count FROM event_log GROUP BY message_code ORDER BY message_code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)
    }
}
