use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of rolling booking statistics. Snapshots are append-only; the
/// newest by watermark is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub num_room_reservations: u64,
    pub max_room_people: u32,
    pub num_activity_reservations: u64,
    pub max_activity_people: u32,
    #[serde(with = "crate::time::iso_millis")]
    pub watermark: DateTime<Utc>,
}

impl AggregateSnapshot {
    pub fn empty(watermark: DateTime<Utc>) -> Self {
        Self {
            num_room_reservations: 0,
            max_room_people: 0,
            num_activity_reservations: 0,
            max_activity_people: 0,
            watermark,
        }
    }
}
