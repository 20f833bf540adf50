use std::sync::Arc;

use innkeep_core::audit::EventArchive;
use innkeep_core::publisher::EventPublisher;
use innkeep_core::repository::{BookingRepository, EventLogRepository, StatsRepository};

#[derive(Clone)]
pub struct Topics {
    pub events: String,
    pub log: String,
}

#[derive(Clone)]
pub struct AppState {
    pub publisher: EventPublisher,
    pub bookings: Arc<dyn BookingRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub event_log: Arc<dyn EventLogRepository>,
    pub archive: Arc<dyn EventArchive>,
    pub topics: Topics,
}
