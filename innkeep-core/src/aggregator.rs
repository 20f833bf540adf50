//! Periodic watermark-based statistics.
//!
//! Each cycle reads the newest snapshot, pulls bookings created in
//! `[watermark, now)` from the storage service, folds them in and appends a
//! new snapshot whose watermark is the cycle's own capture instant. A failed
//! query aborts the cycle before anything is written, so the next cycle
//! re-reads the same window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use innkeep_shared::time::{format_timestamp, now_millis};
use innkeep_shared::{AggregateSnapshot, HotelActivityBooking, HotelRoomBooking, LogMessage, MessageCode};
use tracing::{debug, error, info};

use crate::error::{CycleError, UpstreamQueryError};
use crate::publisher::EventPublisher;
use crate::repository::{EventSource, StatsRepository};

pub const DEFAULT_EVENT_THRESHOLD: usize = 25;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// A cycle that sees strictly more new bookings than this emits a
    /// threshold control event.
    pub event_threshold: usize,
    pub query_timeout: Duration,
    pub log_topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub snapshot: AggregateSnapshot,
    pub new_rooms: usize,
    pub new_activities: usize,
    pub threshold_exceeded: bool,
}

/// Folds one window of bookings into the previous snapshot.
///
/// Maximums only move up, counts are additive, and the watermark never moves
/// backwards even if the wall clock does.
pub fn fold_snapshot(
    previous: &AggregateSnapshot,
    rooms: &[HotelRoomBooking],
    activities: &[HotelActivityBooking],
    now: DateTime<Utc>,
) -> AggregateSnapshot {
    let max_room = rooms.iter().map(|b| b.num_of_people).max().unwrap_or(0);
    let max_activity = activities.iter().map(|b| b.num_of_people).max().unwrap_or(0);

    AggregateSnapshot {
        num_room_reservations: previous.num_room_reservations + rooms.len() as u64,
        max_room_people: previous.max_room_people.max(max_room),
        num_activity_reservations: previous.num_activity_reservations + activities.len() as u64,
        max_activity_people: previous.max_activity_people.max(max_activity),
        watermark: previous.watermark.max(now),
    }
}

pub struct StatsAggregator {
    source: Arc<dyn EventSource>,
    stats: Arc<dyn StatsRepository>,
    publisher: EventPublisher,
    config: AggregatorConfig,
}

impl StatsAggregator {
    pub fn new(
        source: Arc<dyn EventSource>,
        stats: Arc<dyn StatsRepository>,
        publisher: EventPublisher,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            source,
            stats,
            publisher,
            config,
        }
    }

    pub async fn populate(&self) -> Result<CycleReport, CycleError> {
        self.populate_at(now_millis()).await
    }

    /// Runs one cycle with `now` as the capture instant.
    pub async fn populate_at(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        info!("Start Periodic Processing");

        let previous = self
            .stats
            .latest_snapshot()
            .await?
            .unwrap_or_else(|| AggregateSnapshot::empty(now));
        let start = previous.watermark;

        let (rooms, activities) = tokio::try_join!(
            self.bounded(self.source.room_bookings(start, now)),
            self.bounded(self.source.activity_bookings(start, now)),
        )
        .map_err(|e| {
            error!(
                "Failed to retrieve bookings between {} and {}: {}",
                format_timestamp(&start),
                format_timestamp(&now),
                e
            );
            e
        })?;

        info!(
            "Received {} Hotel Room Reservation events and {} Hotel Activity Reservation events",
            rooms.len(),
            activities.len()
        );

        let snapshot = fold_snapshot(&previous, &rooms, &activities, now);
        self.stats.insert_snapshot(&snapshot).await?;

        if !rooms.is_empty() {
            let ids: Vec<&str> = rooms.iter().map(|b| b.trace_id.as_str()).collect();
            debug!("Processed Hotel Room Reservation trace ids: {}", ids.join(", "));
        }
        if !activities.is_empty() {
            let ids: Vec<&str> = activities.iter().map(|b| b.trace_id.as_str()).collect();
            debug!("Processed Hotel Activity Reservation trace ids: {}", ids.join(", "));
        }
        debug!(
            num_room_reservations = snapshot.num_room_reservations,
            max_room_people = snapshot.max_room_people,
            num_activity_reservations = snapshot.num_activity_reservations,
            max_activity_people = snapshot.max_activity_people,
            watermark = %format_timestamp(&snapshot.watermark),
            "Updated statistics"
        );

        let total = rooms.len() + activities.len();
        let threshold_exceeded = total > self.config.event_threshold;
        if threshold_exceeded {
            let message = LogMessage::new(
                MessageCode::ThresholdExceeded,
                format!(
                    "Total events received ({}) exceeded threshold ({})",
                    total, self.config.event_threshold
                ),
            );
            if let Err(e) = self.publisher.publish_log(&self.config.log_topic, &message).await {
                error!("Failed to publish threshold event: {}", e);
            }
        }

        info!("End Periodic Processing");

        Ok(CycleReport {
            snapshot,
            new_rooms: rooms.len(),
            new_activities: activities.len(),
            threshold_exceeded,
        })
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, UpstreamQueryError>
    where
        F: Future<Output = Result<T, UpstreamQueryError>>,
    {
        let limit = self.config.query_timeout;
        tokio::time::timeout(limit, query)
            .await
            .map_err(|_| UpstreamQueryError::Timeout(limit))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{InMemoryStatsRepository, RecordingProducer, ScriptedEventSource};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn rooms(people: &[u32]) -> Vec<HotelRoomBooking> {
        people
            .iter()
            .enumerate()
            .map(|(i, p)| HotelRoomBooking {
                hotel_id: "H1".to_string(),
                customer_id: format!("C{}", i),
                room_id: format!("R{}", i),
                room_type: "double".to_string(),
                num_of_people: *p,
                check_in_date: "2024-04-01".to_string(),
                check_out_date: "2024-04-02".to_string(),
                timestamp: "2024-03-01T12:00:00.000Z".to_string(),
                trace_id: format!("room-{}", i),
            })
            .collect()
    }

    fn activities(people: &[u32]) -> Vec<HotelActivityBooking> {
        people
            .iter()
            .enumerate()
            .map(|(i, p)| HotelActivityBooking {
                hotel_id: "H1".to_string(),
                customer_id: format!("C{}", i),
                activity_id: format!("A{}", i),
                activity_name: "spa".to_string(),
                num_of_people: *p,
                reservation_date: "2024-04-01".to_string(),
                timestamp: "2024-03-01T12:00:00.000Z".to_string(),
                trace_id: format!("activity-{}", i),
            })
            .collect()
    }

    struct Harness {
        source: Arc<ScriptedEventSource>,
        stats: Arc<InMemoryStatsRepository>,
        producer: Arc<RecordingProducer>,
        aggregator: StatsAggregator,
    }

    fn harness(query_timeout: Duration) -> Harness {
        let source = Arc::new(ScriptedEventSource::default());
        let stats = Arc::new(InMemoryStatsRepository::default());
        let producer = Arc::new(RecordingProducer::default());
        let aggregator = StatsAggregator::new(
            source.clone(),
            stats.clone(),
            EventPublisher::new(producer.clone()),
            AggregatorConfig {
                event_threshold: DEFAULT_EVENT_THRESHOLD,
                query_timeout,
                log_topic: "event_log".to_string(),
            },
        );
        Harness {
            source,
            stats,
            producer,
            aggregator,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    #[test]
    fn test_empty_window_keeps_maximums() {
        let previous = AggregateSnapshot {
            num_room_reservations: 4,
            max_room_people: 6,
            num_activity_reservations: 2,
            max_activity_people: 3,
            watermark: t(0),
        };

        let next = fold_snapshot(&previous, &[], &[], t(5));
        assert_eq!(next.max_room_people, 6);
        assert_eq!(next.max_activity_people, 3);
        assert_eq!(next.num_room_reservations, 4);
        assert_eq!(next.watermark, t(5));
    }

    #[test]
    fn test_fold_takes_larger_maximum_and_adds_counts() {
        let previous = AggregateSnapshot {
            num_room_reservations: 1,
            max_room_people: 4,
            num_activity_reservations: 1,
            max_activity_people: 2,
            watermark: t(0),
        };

        let next = fold_snapshot(&previous, &rooms(&[2, 3]), &activities(&[9]), t(5));
        assert_eq!(next.num_room_reservations, 3);
        assert_eq!(next.max_room_people, 4);
        assert_eq!(next.num_activity_reservations, 2);
        assert_eq!(next.max_activity_people, 9);
    }

    #[test]
    fn test_watermark_survives_clock_going_backwards() {
        let previous = AggregateSnapshot::empty(t(10));
        let next = fold_snapshot(&previous, &[], &[], t(3));
        assert_eq!(next.watermark, t(10));
    }

    #[tokio::test]
    async fn test_first_cycle_without_events_starts_at_zero() {
        let h = harness(Duration::from_secs(1));

        let report = h.aggregator.populate_at(t(0)).await.unwrap();
        assert_eq!(report.snapshot, AggregateSnapshot::empty(t(0)));
        assert!(!report.threshold_exceeded);

        assert_eq!(h.stats.latest_snapshot().await.unwrap(), Some(AggregateSnapshot::empty(t(0))));
    }

    #[tokio::test]
    async fn test_window_starts_at_previous_watermark() {
        let h = harness(Duration::from_secs(1));
        h.aggregator.populate_at(t(0)).await.unwrap();
        h.aggregator.populate_at(t(5)).await.unwrap();

        let windows = h.source.windows().await;
        assert_eq!(windows.last(), Some(&(t(0), t(5))));
    }

    #[tokio::test]
    async fn test_threshold_breach_publishes_once() {
        let h = harness(Duration::from_secs(1));
        h.aggregator.populate_at(t(0)).await.unwrap();

        h.source.push(Ok(rooms(&[1; 10])), Ok(activities(&[2; 20]))).await;
        let report = h.aggregator.populate_at(t(5)).await.unwrap();

        assert!(report.threshold_exceeded);
        let sent = h.producer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "event_log");
        let message: LogMessage = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(message.message_code, MessageCode::ThresholdExceeded);
    }

    #[tokio::test]
    async fn test_below_threshold_publishes_nothing() {
        let h = harness(Duration::from_secs(1));
        h.aggregator.populate_at(t(0)).await.unwrap();

        h.source.push(Ok(rooms(&[1; 5])), Ok(activities(&[2; 10]))).await;
        let report = h.aggregator.populate_at(t(5)).await.unwrap();

        assert!(!report.threshold_exceeded);
        assert_eq!(report.snapshot.num_room_reservations, 5);
        assert_eq!(report.snapshot.num_activity_reservations, 10);
        assert!(h.producer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_watermark_unchanged() {
        let h = harness(Duration::from_secs(1));
        h.aggregator.populate_at(t(0)).await.unwrap();

        h.source
            .push(
                Ok(rooms(&[3])),
                Err(UpstreamQueryError::Status {
                    url: "http://storage/booking/hotel-activities".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                }),
            )
            .await;
        let err = h.aggregator.populate_at(t(5)).await.unwrap_err();
        assert!(matches!(err, CycleError::Upstream(UpstreamQueryError::Status { .. })));
        assert_eq!(h.stats.snapshots().await.len(), 1);

        // The next cycle re-reads from the same watermark and sees the booking.
        h.source.push(Ok(rooms(&[3])), Ok(vec![])).await;
        let report = h.aggregator.populate_at(t(10)).await.unwrap();
        assert_eq!(report.snapshot.num_room_reservations, 1);
        assert_eq!(h.source.windows().await.last(), Some(&(t(0), t(10))));
    }

    #[tokio::test]
    async fn test_slow_upstream_counts_as_failure() {
        let h = harness(Duration::from_millis(20));
        h.aggregator.populate_at(t(0)).await.unwrap();

        h.source.stall_next(Duration::from_secs(5)).await;
        let err = h.aggregator.populate_at(t(5)).await.unwrap_err();
        assert!(matches!(err, CycleError::Upstream(UpstreamQueryError::Timeout(_))));
        assert_eq!(h.stats.snapshots().await.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_history_is_monotonic() {
        let h = harness(Duration::from_secs(1));
        h.aggregator.populate_at(t(0)).await.unwrap();

        let windows: Vec<(Vec<u32>, Vec<u32>, bool)> = vec![
            (vec![2, 5], vec![1], true),
            (vec![], vec![], true),
            (vec![1], vec![8], false),
            (vec![3], vec![2, 2], true),
            (vec![9], vec![], true),
        ];
        for (i, (room_people, activity_people, ok)) in windows.into_iter().enumerate() {
            if ok {
                h.source.push(Ok(rooms(&room_people)), Ok(activities(&activity_people))).await;
            } else {
                h.source
                    .push(Err(UpstreamQueryError::Transport("refused".to_string())), Ok(vec![]))
                    .await;
            }
            let _ = h.aggregator.populate_at(t(10 * (i as i64 + 1))).await;
        }

        let history = h.stats.snapshots().await;
        for pair in history.windows(2) {
            assert!(pair[1].watermark >= pair[0].watermark);
            assert!(pair[1].max_room_people >= pair[0].max_room_people);
            assert!(pair[1].max_activity_people >= pair[0].max_activity_people);
        }
        let last = history.last().unwrap();
        assert_eq!(last.max_room_people, 9);
        assert_eq!(last.max_activity_people, 2);
    }
}
