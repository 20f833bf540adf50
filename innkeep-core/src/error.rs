use std::time::Duration;

/// Broker could not be reached within the retry budget.
#[derive(Debug, thiserror::Error)]
#[error("Broker at {endpoint} unreachable after {attempts} attempts: {reason}")]
pub struct ConnectionError {
    pub endpoint: String,
    pub attempts: usize,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database write failed: {0}")]
    Write(String),
    #[error("Database read failed: {0}")]
    Read(String),
    #[error("Stored row is invalid: {0}")]
    InvalidRow(String),
    /// The database refused the row itself; writing it again fails the same way.
    #[error("Database rejected row: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamQueryError {
    #[error("Storage service returned {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("Storage service request failed: {0}")]
    Transport(String),
    #[error("Storage service response could not be decoded: {0}")]
    Decode(String),
    #[error("Storage service did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NotFoundError(pub String);

impl NotFoundError {
    pub fn statistics() -> Self {
        Self("Statistics do not exist".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Broker rejected message for topic {topic}: {reason}")]
    Delivery { topic: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Message has no payload")]
    EmptyPayload,
    #[error("Malformed envelope: {0}")]
    Envelope(String),
    #[error("Booking out of bounds: {0}")]
    OutOfBounds(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to receive message: {0}")]
    Receive(String),
    #[error("Failed to commit offset {offset} on {topic}/{partition}: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
    #[error("Failed to seek to offset {offset} on {topic}/{partition}: {reason}")]
    Seek {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
}

/// Failure of one aggregation cycle. The watermark is unchanged in every case.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Upstream(#[from] UpstreamQueryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
