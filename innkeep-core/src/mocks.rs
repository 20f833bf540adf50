//! In-memory doubles for the storage, broker and upstream seams.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use innkeep_shared::{
    AggregateSnapshot, BookingEvent, HotelActivityBooking, HotelRoomBooking, LoggedEvent, StoredBooking,
};
use tokio::sync::{Mutex, Notify};

use crate::audit::EventArchive;
use crate::consumer::{Delivery, MessageSource};
use crate::error::{PersistenceError, PublishError, SourceError, UpstreamQueryError};
use crate::publisher::BrokerProducer;
use crate::repository::{BookingRepository, EventLogRepository, EventSource, StatsRepository};

// ============================================================================
// Repositories
// ============================================================================

#[derive(Default)]
pub struct InMemoryBookingRepository {
    stored: Mutex<Vec<StoredBooking>>,
    failures: Mutex<usize>,
    rejected: Mutex<HashSet<String>>,
}

impl InMemoryBookingRepository {
    pub async fn stored(&self) -> Vec<StoredBooking> {
        self.stored.lock().await.clone()
    }

    /// The next `n` inserts fail without writing anything.
    pub async fn fail_next_writes(&self, n: usize) {
        *self.failures.lock().await = n;
    }

    /// Every insert of the booking with `trace_id` is refused, as a database
    /// refuses a row that breaks a column constraint.
    pub async fn reject_trace_id(&self, trace_id: &str) {
        self.rejected.lock().await.insert(trace_id.to_string());
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert_booking(&self, booking: &StoredBooking) -> Result<(), PersistenceError> {
        if self.rejected.lock().await.contains(booking.event.trace_id()) {
            return Err(PersistenceError::Rejected(
                "value too long for type character varying(250)".to_string(),
            ));
        }
        let mut failures = self.failures.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(PersistenceError::Write("connection reset".to_string()));
        }
        self.stored.lock().await.push(booking.clone());
        Ok(())
    }

    async fn rooms_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, PersistenceError> {
        let stored = self.stored.lock().await;
        Ok(stored
            .iter()
            .filter(|s| s.date_created >= start && s.date_created < end)
            .filter_map(|s| match &s.event {
                BookingEvent::HotelRoom(b) => Some(b.clone()),
                BookingEvent::HotelActivity(_) => None,
            })
            .collect())
    }

    async fn activities_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, PersistenceError> {
        let stored = self.stored.lock().await;
        Ok(stored
            .iter()
            .filter(|s| s.date_created >= start && s.date_created < end)
            .filter_map(|s| match &s.event {
                BookingEvent::HotelActivity(b) => Some(b.clone()),
                BookingEvent::HotelRoom(_) => None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryStatsRepository {
    snapshots: Mutex<Vec<AggregateSnapshot>>,
}

impl InMemoryStatsRepository {
    pub async fn snapshots(&self) -> Vec<AggregateSnapshot> {
        self.snapshots.lock().await.clone()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn latest_snapshot(&self) -> Result<Option<AggregateSnapshot>, PersistenceError> {
        let snapshots = self.snapshots.lock().await;
        Ok(snapshots.iter().max_by_key(|s| s.watermark).cloned())
    }

    async fn insert_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), PersistenceError> {
        self.snapshots.lock().await.push(snapshot.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<LoggedEvent>>,
}

impl InMemoryEventLog {
    pub async fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventLogRepository for InMemoryEventLog {
    async fn insert_event(&self, event: &LoggedEvent) -> Result<(), PersistenceError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn count_by_code(&self) -> Result<Vec<(String, i64)>, PersistenceError> {
        let events = self.events.lock().await;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for event in events.iter() {
            *counts.entry(event.message_code.code().to_string()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

// ============================================================================
// Broker
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingProducer {
    sent: Mutex<Vec<SentRecord>>,
    failing: Mutex<bool>,
}

impl RecordingProducer {
    pub async fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().await.clone()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }
}

#[async_trait]
impl BrokerProducer for RecordingProducer {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<(), PublishError> {
        if *self.failing.lock().await {
            return Err(PublishError::Delivery {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(SentRecord {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

struct LogState {
    topic: String,
    messages: Vec<Vec<u8>>,
    committed: HashMap<String, i64>,
    crash_at: Option<i64>,
}

/// Single-partition topic with consumer-group offsets. Groups without a
/// committed offset start at the end of the log.
#[derive(Clone)]
pub struct InMemoryLog {
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
}

impl InMemoryLog {
    pub fn new(topic: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                topic: topic.to_string(),
                messages: Vec::new(),
                committed: HashMap::new(),
                crash_at: None,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn append(&self, payload: Vec<u8>) {
        self.state.lock().await.messages.push(payload);
        self.notify.notify_waiters();
    }

    /// Next offset the group will read after a restart.
    pub async fn committed(&self, group: &str) -> Option<i64> {
        self.state.lock().await.committed.get(group).copied()
    }

    /// The commit for `offset` fails once, as if the process died right
    /// after the write and before the commit.
    pub async fn crash_before_commit_at(&self, offset: i64) {
        self.state.lock().await.crash_at = Some(offset);
    }

    pub async fn subscribe(&self, group: &str) -> InMemorySource {
        let state = self.state.lock().await;
        let cursor = state
            .committed
            .get(group)
            .copied()
            .unwrap_or(state.messages.len() as i64);
        InMemorySource {
            log: self.clone(),
            group: group.to_string(),
            cursor,
        }
    }
}

#[async_trait]
impl EventArchive for InMemoryLog {
    async fn read_all(&self) -> Result<Vec<Vec<u8>>, SourceError> {
        Ok(self.state.lock().await.messages.clone())
    }
}

pub struct InMemorySource {
    log: InMemoryLog,
    group: String,
    cursor: i64,
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn next(&mut self) -> Result<Delivery, SourceError> {
        loop {
            let notified = self.log.notify.notified();
            {
                let state = self.log.state.lock().await;
                if let Some(payload) = state.messages.get(self.cursor as usize) {
                    let delivery = Delivery {
                        topic: state.topic.clone(),
                        partition: 0,
                        offset: self.cursor,
                        payload: Some(payload.clone()),
                    };
                    self.cursor += 1;
                    return Ok(delivery);
                }
            }
            notified.await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), SourceError> {
        let mut state = self.log.state.lock().await;
        if state.crash_at == Some(delivery.offset) {
            state.crash_at = None;
            return Err(SourceError::Commit {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
                reason: "process terminated".to_string(),
            });
        }
        state.committed.insert(self.group.clone(), delivery.offset + 1);
        Ok(())
    }

    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), SourceError> {
        self.cursor = delivery.offset;
        Ok(())
    }
}

// ============================================================================
// Upstream storage service
// ============================================================================

#[derive(Default)]
struct Script {
    rooms: Option<Result<Vec<HotelRoomBooking>, UpstreamQueryError>>,
    activities: Option<Result<Vec<HotelActivityBooking>, UpstreamQueryError>>,
    stall: Option<Duration>,
}

#[derive(Default)]
struct ScriptState {
    scripts: VecDeque<Script>,
    current: Option<(DateTime<Utc>, Script)>,
    windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ScriptState {
    /// Both queries of one cycle share a window end, so they read the same script.
    fn script_for(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> &mut Script {
        let fresh = !matches!(&self.current, Some((current_end, _)) if *current_end == end);
        if fresh {
            self.windows.push((start, end));
            self.current = None;
        }
        let scripts = &mut self.scripts;
        &mut self
            .current
            .get_or_insert_with(|| (end, scripts.pop_front().unwrap_or_default()))
            .1
    }
}

/// Storage service answering each aggregation cycle from a queue of scripted
/// responses; cycles without a script see no bookings.
#[derive(Default)]
pub struct ScriptedEventSource {
    state: Mutex<ScriptState>,
}

impl ScriptedEventSource {
    pub async fn push(
        &self,
        rooms: Result<Vec<HotelRoomBooking>, UpstreamQueryError>,
        activities: Result<Vec<HotelActivityBooking>, UpstreamQueryError>,
    ) {
        self.state.lock().await.scripts.push_back(Script {
            rooms: Some(rooms),
            activities: Some(activities),
            stall: None,
        });
    }

    /// The next cycle's queries take `delay` to answer.
    pub async fn stall_next(&self, delay: Duration) {
        self.state.lock().await.scripts.push_back(Script {
            stall: Some(delay),
            ..Script::default()
        });
    }

    /// Every `[start, end)` window queried so far, one per cycle.
    pub async fn windows(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().await.windows.clone()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn room_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelRoomBooking>, UpstreamQueryError> {
        let (stall, result) = {
            let mut state = self.state.lock().await;
            let script = state.script_for(start, end);
            (script.stall, script.rooms.take())
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        result.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn activity_bookings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HotelActivityBooking>, UpstreamQueryError> {
        let (stall, result) = {
            let mut state = self.state.lock().await;
            let script = state.script_for(start, end);
            (script.stall, script.activities.take())
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        result.unwrap_or_else(|| Ok(Vec::new()))
    }
}
