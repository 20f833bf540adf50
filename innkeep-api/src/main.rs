use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use innkeep_api::{app, worker, AppState, Topics};
use innkeep_core::aggregator::{AggregatorConfig, StatsAggregator};
use innkeep_core::publisher::EventPublisher;
use innkeep_core::repository::{BookingRepository, EventLogRepository, StatsRepository};
use innkeep_core::retry::RetryPolicy;
use innkeep_core::sink::LogSinkHandler;
use innkeep_core::storage::BookingStorageHandler;
use innkeep_shared::MessageCode;
use innkeep_store::app_config::Config;
use innkeep_store::{DbClient, HttpEventSource, PgBookingRepository, PgEventLogRepository, PgStatsRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const AUDIT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "innkeep_api=debug,innkeep_core=debug,innkeep_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Innkeep on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let stats: Arc<dyn StatsRepository> = Arc::new(PgStatsRepository::new(db.pool.clone()));
    let event_log: Arc<dyn EventLogRepository> = Arc::new(PgEventLogRepository::new(db.pool.clone()));

    // Kafka
    let kafka = &config.kafka;
    let connection = innkeep_store::connect(
        &kafka.brokers(),
        &[kafka.events_topic.clone(), kafka.log_topic.clone()],
        RetryPolicy::new(kafka.max_retries, kafka.retry_sleep()),
        kafka.delivery_timeout(),
    )
    .await?;
    let publisher = EventPublisher::new(Arc::new(connection.producer()));

    // The log sink joins first so a fresh group sees the startup announcements.
    let log_source = connection
        .subscribe(&kafka.log_topic, &kafka.log_group)
        .context("Failed to subscribe event log consumer")?;
    let log_assignment = log_source.assignment();
    worker::spawn_consumer(
        "event_log",
        log_source,
        LogSinkHandler::new(event_log.clone()),
        kafka.persist_retry(),
    );
    if !log_assignment.wait(ASSIGNMENT_TIMEOUT).await {
        tracing::warn!("event_log consumer has no partitions after {:?}, startup announcements may be missed", ASSIGNMENT_TIMEOUT);
    }

    worker::announce(&publisher, &kafka.log_topic, MessageCode::StartedReceiver, "Receiver service started").await;

    let storage_source = connection
        .subscribe(&kafka.events_topic, &kafka.storage_group)
        .context("Failed to subscribe storage consumer")?;
    let storage_assignment = storage_source.assignment();
    worker::spawn_consumer(
        "storage",
        storage_source,
        BookingStorageHandler::new(bookings.clone()),
        kafka.persist_retry(),
    );
    if !storage_assignment.wait(ASSIGNMENT_TIMEOUT).await {
        tracing::warn!("storage consumer has no partitions after {:?}", ASSIGNMENT_TIMEOUT);
    }
    worker::announce(&publisher, &kafka.log_topic, MessageCode::StartedStorage, "Storage service started").await;

    // Aggregation
    let query_timeout = Duration::from_secs(config.processing.query_timeout_secs);
    let event_source = HttpEventSource::new(config.processing.eventstore_url.clone(), query_timeout)
        .context("Failed to build storage service client")?;
    let aggregator = StatsAggregator::new(
        Arc::new(event_source),
        stats.clone(),
        publisher.clone(),
        AggregatorConfig {
            event_threshold: config.processing.event_threshold,
            query_timeout,
            log_topic: kafka.log_topic.clone(),
        },
    );
    worker::announce(&publisher, &kafka.log_topic, MessageCode::StartedProcessing, "Processing service started").await;
    worker::spawn_scheduler(aggregator, Duration::from_secs(config.scheduler.period_secs));

    let app_state = AppState {
        publisher,
        bookings,
        stats,
        event_log,
        archive: Arc::new(connection.archive(&kafka.events_topic, AUDIT_IDLE_TIMEOUT)),
        topics: Topics {
            events: kafka.events_topic.clone(),
            log: kafka.log_topic.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
