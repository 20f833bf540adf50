pub mod app_config;
pub mod audit_reader;
pub mod booking_repo;
pub mod broker;
pub mod database;
pub mod event_log_repo;
pub mod events;
pub mod stats_repo;
pub mod storage_client;

pub use audit_reader::KafkaArchive;
pub use booking_repo::PgBookingRepository;
pub use broker::{connect, AssignmentWatch, ConnectionHandle, KafkaSource};
pub use database::DbClient;
pub use event_log_repo::PgEventLogRepository;
pub use events::KafkaEventProducer;
pub use stats_repo::PgStatsRepository;
pub use storage_client::HttpEventSource;
