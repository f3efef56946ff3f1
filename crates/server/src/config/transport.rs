use std::time::Duration;

use serde::Deserialize;

/// Where the two inbound streams come from.
#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    /// Which backend to use: `"lines"` (JSON-lines files) or `"kafka"`.
    #[serde(default = "default_transport_backend")]
    pub backend: String,
    /// Raw record file for the `lines` backend.
    #[serde(default = "default_raw_path")]
    pub raw_path: String,
    /// Consent decision file for the `lines` backend.
    #[serde(default = "default_consent_path")]
    pub consent_path: String,
    /// Keep waiting for appended lines at end of file.
    #[serde(default = "default_follow")]
    pub follow: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Kafka bootstrap servers, shared with the `kafka` sink by default.
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,
    #[serde(default = "default_consent_topic")]
    pub consent_topic: String,
    /// Base consumer group; each stream appends its own suffix.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Optional suffix for consumer group names, so that two relays
    /// running side by side each get every partition.
    pub run_id: Option<String>,
    /// Start position on every start; offsets are never committed.
    #[serde(default = "default_offset_reset")]
    pub offset_reset: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_transport_backend(),
            raw_path: default_raw_path(),
            consent_path: default_consent_path(),
            follow: default_follow(),
            poll_interval_ms: default_poll_interval_ms(),
            brokers: default_brokers(),
            raw_topic: default_raw_topic(),
            consent_topic: default_consent_topic(),
            group_id: default_group_id(),
            run_id: None,
            offset_reset: default_offset_reset(),
        }
    }
}

impl TransportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_transport_backend() -> String {
    "lines".to_owned()
}

fn default_raw_path() -> String {
    "data/raw.jsonl".to_owned()
}

fn default_consent_path() -> String {
    "data/consent.jsonl".to_owned()
}

fn default_follow() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_brokers() -> String {
    "localhost:9092".to_owned()
}

fn default_raw_topic() -> String {
    "nhs.raw.prescriptions".to_owned()
}

fn default_consent_topic() -> String {
    "consent.events".to_owned()
}

fn default_group_id() -> String {
    "gatekeeper".to_owned()
}

fn default_offset_reset() -> String {
    "earliest".to_owned()
}

/// Where permitted records are published.
#[derive(Debug, Deserialize)]
pub struct SinkConfig {
    /// Which backend to use: `"log"`, `"memory"`, or `"kafka"`.
    #[serde(default = "default_sink_backend")]
    pub backend: String,
    /// Kafka bootstrap servers. Falls back to `[transport] brokers`.
    pub brokers: Option<String>,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication")]
    pub replication: i32,
    #[serde(default = "default_send_timeout_seconds")]
    pub send_timeout_seconds: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: default_sink_backend(),
            brokers: None,
            partitions: default_partitions(),
            replication: default_replication(),
            send_timeout_seconds: default_send_timeout_seconds(),
        }
    }
}

fn default_sink_backend() -> String {
    "log".to_owned()
}

fn default_partitions() -> i32 {
    1
}

fn default_replication() -> i32 {
    1
}

fn default_send_timeout_seconds() -> u64 {
    5
}
