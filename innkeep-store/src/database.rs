use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use innkeep_core::PersistenceError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

pub(crate) fn write_error(e: sqlx::Error) -> PersistenceError {
    let sqlstate = e
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    classify_write(sqlstate.as_deref(), e.to_string())
}

/// SQLSTATE class 22 (data exception) and 23 (integrity violation) are
/// properties of the row, not of the connection.
fn classify_write(sqlstate: Option<&str>, reason: String) -> PersistenceError {
    match sqlstate {
        Some(code) if code.starts_with("22") || code.starts_with("23") => {
            PersistenceError::Rejected(reason)
        }
        _ => PersistenceError::Write(reason),
    }
}

pub(crate) fn read_error(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Read(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_exceptions_are_rejections() {
        // string_data_right_truncation, numeric_value_out_of_range, not_null_violation
        for code in ["22001", "22003", "23502"] {
            let err = classify_write(Some(code), "bad row".to_string());
            assert!(matches!(err, PersistenceError::Rejected(_)), "{}", code);
        }
    }

    #[test]
    fn test_other_failures_stay_retryable() {
        assert!(matches!(
            classify_write(Some("40001"), "serialization failure".to_string()),
            PersistenceError::Write(_)
        ));
        assert!(matches!(
            classify_write(Some("08006"), "connection failure".to_string()),
            PersistenceError::Write(_)
        ));
        assert!(matches!(
            classify_write(None, "pool timed out".to_string()),
            PersistenceError::Write(_)
        ));
    }

    #[test]
    fn test_non_database_errors_stay_retryable() {
        assert!(matches!(write_error(sqlx::Error::PoolTimedOut), PersistenceError::Write(_)));
    }
}
