use anyhow::bail;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum pooled PostgreSQL connections; bounds concurrent sessions
    #[serde(default = "default_postgres_max_connections")]
    pub postgres_max_connections: usize,

    /// Apply migrations with goose on startup
    #[serde(default = "default_postgres_run_migrations")]
    pub postgres_run_migrations: bool,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // MQTT configuration
    /// MQTT broker URL
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Subscription filter covering every device topic
    #[serde(default = "default_mqtt_subscribe_filter")]
    pub mqtt_subscribe_filter: String,

    /// Topic segment delimiter (a single character)
    #[serde(default = "default_mqtt_topic_delimiter")]
    pub mqtt_topic_delimiter: String,

    /// Required first topic segment; any prefix is accepted when unset
    #[serde(default)]
    pub mqtt_topic_prefix: Option<String>,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Messages dispatched concurrently before the subscriber stops reading
    #[serde(default = "default_mqtt_max_in_flight")]
    pub mqtt_max_in_flight: usize,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // Realtime cache configuration
    /// Seconds a device snapshot stays live after its last push
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Seconds between sweeps of expired snapshots
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "kerbside".to_string()
}

fn default_postgres_username() -> String {
    "kerbside".to_string()
}

fn default_postgres_password() -> String {
    "kerbside".to_string()
}

fn default_postgres_max_connections() -> usize {
    16
}

fn default_postgres_run_migrations() -> bool {
    true
}

fn default_postgres_migrations_dir() -> String {
    "/home/kerbside/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

// MQTT defaults
fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "kerbside-all-in-one".to_string()
}

fn default_mqtt_subscribe_filter() -> String {
    "+/+/+".to_string()
}

fn default_mqtt_topic_delimiter() -> String {
    "/".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_mqtt_max_in_flight() -> usize {
    64
}

// HTTP defaults
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

// Cache defaults
fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cache_sweep_interval_secs() -> u64 {
    30
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "kerbside-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("KERBSIDE"))
            .build()?
            .try_deserialize()
    }

    pub fn topic_delimiter(&self) -> anyhow::Result<char> {
        let mut chars = self.mqtt_topic_delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => bail!(
                "topic delimiter must be a single character, got '{}'",
                self.mqtt_topic_delimiter
            ),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }
}
