use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSubscriberConfig {
    /// Broker address as `mqtt://host:port`, `tcp://host:port` or `host:port`
    pub broker_url: String,

    pub client_id: String,

    /// Subscription filter, e.g. `v2x/+/+`
    pub subscribe_filter: String,

    /// Keep-alive interval in seconds (default: 30)
    pub keep_alive_secs: u64,

    /// Delay before reconnecting after a connection error (default: 5 seconds)
    pub retry_delay_secs: u64,

    /// Consecutive connection failures tolerated before giving up (default: 10)
    pub max_retry_attempts: u32,

    /// Upper bound on messages being dispatched at once (default: 64)
    pub max_in_flight: usize,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "kerbside-ingestion".to_string(),
            subscribe_filter: "+/+/+".to_string(),
            keep_alive_secs: 30,
            retry_delay_secs: 5,
            max_retry_attempts: 10,
            max_in_flight: 64,
        }
    }
}

impl MqttSubscriberConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}
