use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use innkeep_shared::{BookingEnvelope, BookingEvent, LogMessage};
use serde::Serialize;
use tracing::debug;

use crate::error::PublishError;

/// Raw send primitive of the broker. `send` resolves once the broker has
/// acknowledged the record or failed to.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<(), PublishError>;
}

/// Wraps domain events in their wire envelopes and publishes them, one
/// synchronous send per call.
#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn BrokerProducer>,
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn BrokerProducer>) -> Self {
        Self { producer }
    }

    pub async fn publish_booking(&self, topic: &str, event: &BookingEvent) -> Result<BookingEnvelope, PublishError> {
        let envelope = BookingEnvelope::wrap(event, &Utc::now())?;
        self.publish(topic, Some(event.trace_id()), &envelope).await?;
        debug!(topic, trace_id = event.trace_id(), kind = %event.kind(), "Published booking event");
        Ok(envelope)
    }

    pub async fn publish_log(&self, topic: &str, message: &LogMessage) -> Result<(), PublishError> {
        self.publish(topic, Some(message.message_code.code()), message).await?;
        debug!(topic, code = %message.message_code, "Published control event");
        Ok(())
    }

    async fn publish<T: Serialize + Sync>(&self, topic: &str, key: Option<&str>, envelope: &T) -> Result<(), PublishError> {
        let json = serde_json::to_vec(envelope)?;
        self.producer.send(topic, key, &json).await
    }
}
