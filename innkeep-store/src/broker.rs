//! Broker connection bootstrap and the consumer-group message source.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::watch;
use tokio::task::block_in_place;
use tracing::{debug, info};

use innkeep_core::consumer::{Delivery, MessageSource};
use innkeep_core::retry::{retry_bounded, RetryPolicy};
use innkeep_core::{ConnectionError, SourceError};

use crate::audit_reader::KafkaArchive;
use crate::events::KafkaEventProducer;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Kafka(#[from] KafkaError),
    #[error("Topic {topic} is not available: {reason}")]
    Topic { topic: String, reason: String },
    #[error("Metadata lookup did not complete: {0}")]
    Task(String),
}

/// Live broker session, owned by whoever starts the process and handed to
/// each component that needs to publish or consume.
pub struct ConnectionHandle {
    brokers: String,
    producer: KafkaEventProducer,
}

impl ConnectionHandle {
    pub fn producer(&self) -> KafkaEventProducer {
        self.producer.clone()
    }

    /// Joins `group` on `topic` with manual commits. A group with no
    /// committed offset starts from the latest message, so nothing published
    /// before [`KafkaSource::assignment`] resolves is seen by a fresh group.
    pub fn subscribe(&self, topic: &str, group: &str) -> Result<KafkaSource, KafkaError> {
        let (assigned, assignment) = watch::channel(false);
        let consumer: StreamConsumer<GroupContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .create_with_context(GroupContext {
                group: group.to_string(),
                assigned,
            })?;

        consumer.subscribe(&[topic])?;
        info!(topic, consumer_group = group, manual_commit = true, "Subscribed to topic");

        Ok(KafkaSource {
            consumer,
            assignment: AssignmentWatch(assignment),
        })
    }

    pub fn archive(&self, topic: &str, idle_timeout: Duration) -> KafkaArchive {
        KafkaArchive::new(self.brokers.clone(), topic.to_string(), idle_timeout)
    }
}

/// Opens a producer and checks that every topic resolves, retrying the whole
/// attempt under `policy`.
pub async fn connect(
    brokers: &str,
    topics: &[String],
    policy: RetryPolicy,
    delivery_timeout: Duration,
) -> Result<ConnectionHandle, ConnectionError> {
    let result = retry_bounded(policy, "Connecting to Kafka", |_| {
        let brokers = brokers.to_string();
        let topics = topics.to_vec();
        async move { open(brokers, topics, delivery_timeout).await }
    })
    .await;

    match result {
        Ok(producer) => {
            info!("Connected to Kafka at {}", brokers);
            Ok(ConnectionHandle {
                brokers: brokers.to_string(),
                producer,
            })
        }
        Err(exhausted) => Err(ConnectionError {
            endpoint: brokers.to_string(),
            attempts: exhausted.attempts,
            reason: exhausted.last_error.to_string(),
        }),
    }
}

async fn open(
    brokers: String,
    topics: Vec<String>,
    delivery_timeout: Duration,
) -> Result<KafkaEventProducer, BrokerError> {
    let producer = KafkaEventProducer::new(&brokers, delivery_timeout)?;
    let probe = producer.inner().clone();

    tokio::task::spawn_blocking(move || resolve_topics(&probe, &topics))
        .await
        .map_err(|e| BrokerError::Task(e.to_string()))??;

    Ok(producer)
}

fn resolve_topics(producer: &FutureProducer, topics: &[String]) -> Result<(), BrokerError> {
    for topic in topics {
        let metadata = producer.client().fetch_metadata(Some(topic.as_str()), METADATA_TIMEOUT)?;
        let entry = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| BrokerError::Topic {
                topic: topic.clone(),
                reason: "missing from cluster metadata".to_string(),
            })?;

        if let Some(err) = entry.error() {
            return Err(BrokerError::Topic {
                topic: topic.clone(),
                reason: format!("{:?}", err),
            });
        }
        if entry.partitions().is_empty() {
            return Err(BrokerError::Topic {
                topic: topic.clone(),
                reason: "no partitions".to_string(),
            });
        }
        debug!(topic = %topic, partitions = entry.partitions().len(), "Resolved topic");
    }
    Ok(())
}

/// Flags the first non-empty partition assignment of a consumer group.
pub struct GroupContext {
    group: String,
    assigned: watch::Sender<bool>,
}

impl GroupContext {
    fn record(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(partitions) = rebalance {
            if partitions.count() > 0 {
                info!(consumer_group = %self.group, partitions = partitions.count(), "Partitions assigned");
                self.assigned.send_replace(true);
            }
        }
    }
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        self.record(rebalance);
    }
}

/// Resolves once the group owns at least one partition. Assignments are only
/// served while the source is being polled.
#[derive(Clone)]
pub struct AssignmentWatch(watch::Receiver<bool>);

impl AssignmentWatch {
    /// `false` if no assignment arrived within `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.0.wait_for(|assigned| *assigned))
            .await
            .map(|changed| changed.is_ok())
            .unwrap_or(false)
    }
}

pub struct KafkaSource {
    consumer: StreamConsumer<GroupContext>,
    assignment: AssignmentWatch,
}

impl KafkaSource {
    pub fn assignment(&self) -> AssignmentWatch {
        self.assignment.clone()
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next(&mut self) -> Result<Delivery, SourceError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SourceError::Receive(e.to_string()))?;

        Ok(Delivery {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        })
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), SourceError> {
        let commit_error = |reason: String| SourceError::Commit {
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            reason,
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&delivery.topic, delivery.partition, Offset::Offset(delivery.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;

        block_in_place(|| self.consumer.commit(&offsets, CommitMode::Sync))
            .map_err(|e| commit_error(e.to_string()))
    }

    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), SourceError> {
        block_in_place(|| {
            self.consumer.seek(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset),
                SEEK_TIMEOUT,
            )
        })
        .map_err(|e| SourceError::Seek {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (GroupContext, AssignmentWatch) {
        let (assigned, assignment) = watch::channel(false);
        let context = GroupContext {
            group: "log_group".to_string(),
            assigned,
        };
        (context, AssignmentWatch(assignment))
    }

    #[tokio::test]
    async fn test_assignment_resolves_after_partitions_arrive() {
        let (context, assignment) = context();
        let mut partitions = TopicPartitionList::new();
        partitions.add_partition("event_log", 0);

        context.record(&Rebalance::Assign(&partitions));
        assert!(assignment.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_empty_assignment_or_revoke_is_not_ready() {
        let (context, assignment) = context();
        let empty = TopicPartitionList::new();
        let mut partitions = TopicPartitionList::new();
        partitions.add_partition("event_log", 0);

        context.record(&Rebalance::Assign(&empty));
        context.record(&Rebalance::Revoke(&partitions));
        assert!(!assignment.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_later_assignment() {
        let (context, assignment) = context();
        let waiter = tokio::spawn(assignment.wait(Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut partitions = TopicPartitionList::new();
        partitions.add_partition("event_log", 0);
        context.record(&Rebalance::Assign(&partitions));

        assert!(waiter.await.unwrap());
    }
}
