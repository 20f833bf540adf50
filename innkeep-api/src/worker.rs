//! Background activities started next to the HTTP server. Each runs as its
//! own task for the process lifetime and talks to the others only through
//! storage.

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{error, info};

use innkeep_core::aggregator::StatsAggregator;
use innkeep_core::consumer::{DurableConsumer, MessageHandler, MessageSource};
use innkeep_core::publisher::EventPublisher;
use innkeep_shared::{LogMessage, MessageCode};

pub fn spawn_consumer<S, H>(name: &str, source: S, handler: H, retry_delay: Duration) -> JoinHandle<()>
where
    S: MessageSource + 'static,
    H: MessageHandler + 'static,
{
    let consumer = DurableConsumer::new(name, source, handler, retry_delay);
    tokio::spawn(consumer.run())
}

/// Runs one aggregation cycle per `period`, the first one a full period
/// after startup. A failed cycle is logged and the next tick tries again.
pub fn spawn_scheduler(aggregator: StatsAggregator, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler started, period {:?}", period);

        loop {
            ticker.tick().await;
            match aggregator.populate().await {
                Ok(report) => info!(
                    new_rooms = report.new_rooms,
                    new_activities = report.new_activities,
                    threshold_exceeded = report.threshold_exceeded,
                    "Periodic processing completed"
                ),
                Err(e) => error!("Periodic processing failed: {}", e),
            }
        }
    })
}

/// Publishes a lifecycle message to the log topic. Failures are only logged.
pub async fn announce(publisher: &EventPublisher, topic: &str, code: MessageCode, info: &str) {
    if let Err(e) = publisher.publish_log(topic, &LogMessage::new(code, info)).await {
        error!("Failed to publish {} message: {}", code, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use innkeep_core::aggregator::AggregatorConfig;
    use innkeep_core::mocks::{InMemoryStatsRepository, RecordingProducer, ScriptedEventSource};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scheduler_waits_a_period_before_first_cycle() {
        let stats = Arc::new(InMemoryStatsRepository::default());
        let aggregator = StatsAggregator::new(
            Arc::new(ScriptedEventSource::default()),
            stats.clone(),
            EventPublisher::new(Arc::new(RecordingProducer::default())),
            AggregatorConfig {
                event_threshold: 25,
                query_timeout: Duration::from_secs(1),
                log_topic: "event_log".to_string(),
            },
        );

        let handle = spawn_scheduler(aggregator, Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(stats.snapshots().await.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let snapshots = stats.snapshots().await;
        assert!(!snapshots.is_empty());
        assert!(snapshots.windows(2).all(|w| w[0].watermark <= w[1].watermark));
        handle.abort();
    }

    #[tokio::test]
    async fn test_announce_swallows_publish_failure() {
        let producer = Arc::new(RecordingProducer::default());
        producer.set_failing(true).await;
        let publisher = EventPublisher::new(producer.clone());

        announce(&publisher, "event_log", MessageCode::StartedReceiver, "Receiver started").await;
        assert!(producer.sent().await.is_empty());

        producer.set_failing(false).await;
        announce(&publisher, "event_log", MessageCode::StartedReceiver, "Receiver started").await;
        let sent = producer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key.as_deref(), Some("0001"));
    }
}
