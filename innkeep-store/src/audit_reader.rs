use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;
use uuid::Uuid;

use innkeep_core::audit::EventArchive;
use innkeep_core::SourceError;

/// Reads a topic from its first offset with a throwaway group id, so no
/// committed offsets are ever touched.
pub struct KafkaArchive {
    brokers: String,
    topic: String,
    idle_timeout: Duration,
}

impl KafkaArchive {
    pub fn new(brokers: String, topic: String, idle_timeout: Duration) -> Self {
        Self {
            brokers,
            topic,
            idle_timeout,
        }
    }
}

#[async_trait]
impl EventArchive for KafkaArchive {
    async fn read_all(&self) -> Result<Vec<Vec<u8>>, SourceError> {
        let brokers = self.brokers.clone();
        let topic = self.topic.clone();
        let idle = self.idle_timeout;

        tokio::task::spawn_blocking(move || read_topic(&brokers, &topic, idle))
            .await
            .map_err(|e| SourceError::Receive(e.to_string()))?
            .map_err(|e| SourceError::Receive(e.to_string()))
    }
}

fn read_topic(brokers: &str, topic: &str, idle: Duration) -> Result<Vec<Vec<u8>>, KafkaError> {
    let consumer: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", format!("innkeep-audit-{}", Uuid::new_v4()))
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "true")
        .create()?;

    let metadata = consumer.fetch_metadata(Some(topic), idle)?;
    let mut assignment = TopicPartitionList::new();
    let mut pending = HashSet::new();
    for partition in metadata
        .topics()
        .iter()
        .filter(|t| t.name() == topic)
        .flat_map(|t| t.partitions())
    {
        assignment.add_partition_offset(topic, partition.id(), Offset::Beginning)?;
        pending.insert(partition.id());
    }
    if pending.is_empty() {
        return Ok(Vec::new());
    }
    consumer.assign(&assignment)?;

    let mut messages = Vec::new();
    // Stop once every partition reported EOF, or the topic went quiet.
    while !pending.is_empty() {
        match consumer.poll(idle) {
            None => break,
            Some(Ok(message)) => {
                if let Some(payload) = message.payload() {
                    messages.push(payload.to_vec());
                }
            }
            Some(Err(KafkaError::PartitionEOF(partition))) => {
                pending.remove(&partition);
            }
            Some(Err(e)) => return Err(e),
        }
    }

    debug!(topic, count = messages.len(), "Read topic for audit");
    Ok(messages)
}
