use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub scheduler: SchedulerConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub hostname: String,
    pub port: u16,
    pub events_topic: String,
    pub log_topic: String,
    pub storage_group: String,
    pub log_group: String,
    pub max_retries: usize,
    pub retry_sleep_secs: u64,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    #[serde(default = "default_persist_retry_ms")]
    pub persist_retry_ms: u64,
}

fn default_delivery_timeout_ms() -> u64 { 5000 }
fn default_persist_retry_ms() -> u64 { 1000 }

impl KafkaConfig {
    pub fn brokers(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_secs(self.retry_sleep_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn persist_retry(&self) -> Duration {
        Duration::from_millis(self.persist_retry_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub period_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_event_threshold")]
    pub event_threshold: usize,
    pub eventstore_url: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_event_threshold() -> usize { innkeep_core::aggregator::DEFAULT_EVENT_THRESHOLD }
fn default_query_timeout_secs() -> u64 { 10 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked local overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `INNKEEP_KAFKA__HOSTNAME=broker` sets `kafka.hostname`
            .add_source(config::Environment::with_prefix("INNKEEP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
