use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use innkeep_core::publisher::BrokerProducer;
use innkeep_core::PublishError;

#[derive(Clone)]
pub struct KafkaEventProducer {
    producer: FutureProducer,
}

impl KafkaEventProducer {
    /// `delivery_timeout` bounds how long a send waits for the broker's
    /// acknowledgement before it is reported as failed.
    pub fn new(brokers: &str, delivery_timeout: Duration) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string())
            .create()?;

        Ok(Self { producer })
    }

    pub(crate) fn inner(&self) -> &FutureProducer {
        &self.producer
    }
}

#[async_trait]
impl BrokerProducer for KafkaEventProducer {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<(), PublishError> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(_) => {
                info!("Sent message to {} (key {:?})", topic, key);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(PublishError::Delivery {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
