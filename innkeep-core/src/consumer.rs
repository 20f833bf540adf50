//! Durable consumer loop with at-least-once persistence.
//!
//! Per message: receive, hand the payload to a [`MessageHandler`], and only
//! when the handler reports that its write committed, commit the offset.
//! A crash between the write and the commit redelivers the message on
//! restart; nothing is deduplicated, so redelivery can double-count.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{DecodeError, PersistenceError, SourceError};

/// A message as handed out by a [`MessageSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// Consumer-group view of one subscribed topic.
#[async_trait]
pub trait MessageSource: Send {
    /// Blocks until the next message is available.
    async fn next(&mut self) -> Result<Delivery, SourceError>;

    /// Records `delivery` as consumed for the group.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), SourceError>;

    /// Repositions the source so `delivery` is handed out again.
    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The payload can never be persisted; redelivering it is pointless.
    #[error(transparent)]
    Malformed(#[from] DecodeError),
    /// The database refused this row; redelivering it is pointless.
    #[error(transparent)]
    Rejected(PersistenceError),
    /// The write did not commit; the message must be redelivered.
    #[error(transparent)]
    Persistence(PersistenceError),
}

impl From<PersistenceError> for HandleError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Rejected(_) => HandleError::Rejected(err),
            other => HandleError::Persistence(other),
        }
    }
}

/// Returned by a handler once its write committed. The loop commits an
/// offset only when it holds one.
#[derive(Debug, Clone, PartialEq)]
pub struct Persisted {
    pub description: String,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<Persisted, HandleError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Persisted and offset committed.
    Committed(Persisted),
    /// Undecodable or refused payload; offset committed without a write.
    Skipped(String),
    /// Write failed; offset left alone and the source rewound.
    Retrying(String),
}

pub struct DurableConsumer<S, H> {
    name: String,
    source: S,
    handler: H,
    retry_delay: Duration,
}

impl<S: MessageSource, H: MessageHandler> DurableConsumer<S, H> {
    pub fn new(name: impl Into<String>, source: S, handler: H, retry_delay: Duration) -> Self {
        Self {
            name: name.into(),
            source,
            handler,
            retry_delay,
        }
    }

    /// Runs POLL → PERSIST → COMMIT for a single message.
    pub async fn process_next(&mut self) -> Result<Outcome, SourceError> {
        let delivery = self.source.next().await?;
        debug!(
            consumer = %self.name,
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "Received message"
        );

        let result = match delivery.payload.as_deref() {
            Some(payload) => self.handler.handle(payload).await,
            None => Err(HandleError::Malformed(DecodeError::EmptyPayload)),
        };

        match result {
            Ok(persisted) => {
                self.source.commit(&delivery).await?;
                debug!(consumer = %self.name, offset = delivery.offset, "Stored {}", persisted.description);
                Ok(Outcome::Committed(persisted))
            }
            Err(e @ (HandleError::Malformed(_) | HandleError::Rejected(_))) => {
                warn!(
                    consumer = %self.name,
                    offset = delivery.offset,
                    error = %e,
                    "Skipping message that cannot be stored"
                );
                self.source.commit(&delivery).await?;
                Ok(Outcome::Skipped(e.to_string()))
            }
            Err(HandleError::Persistence(e)) => {
                error!(
                    consumer = %self.name,
                    offset = delivery.offset,
                    error = %e,
                    "Persistence failed, offset not committed"
                );
                self.source.rewind(&delivery).await?;
                Ok(Outcome::Retrying(e.to_string()))
            }
        }
    }

    /// Runs until the process exits. Failures are logged and the loop
    /// continues with the next message.
    pub async fn run(mut self) {
        info!(consumer = %self.name, "Consumer loop started");
        loop {
            match self.process_next().await {
                Ok(Outcome::Retrying(_)) => tokio::time::sleep(self.retry_delay).await,
                Ok(_) => {}
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Broker error");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
