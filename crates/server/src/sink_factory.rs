use std::sync::Arc;

#[cfg(feature = "kafka")]
use gatekeeper_router::{KafkaSink, KafkaSinkConfig};
use gatekeeper_router::{DynChannelSink, LogSink, MemorySink};

use crate::config::GatekeeperConfig;
use crate::error::ServerError;

/// Create the output sink named by `[sink] backend`.
pub fn create_sink(config: &GatekeeperConfig) -> Result<Arc<dyn DynChannelSink>, ServerError> {
    let sink: Arc<dyn DynChannelSink> = match config.sink.backend.as_str() {
        "log" => Arc::new(LogSink::new("log")),
        "memory" => Arc::new(MemorySink::new()),
        #[cfg(feature = "kafka")]
        "kafka" => {
            let kafka_config = KafkaSinkConfig {
                brokers: config
                    .sink
                    .brokers
                    .clone()
                    .unwrap_or_else(|| config.transport.brokers.clone()),
                client_id: config.transport.group_id.clone(),
                partitions: config.sink.partitions,
                replication: config.sink.replication,
                send_timeout: std::time::Duration::from_secs(config.sink.send_timeout_seconds),
            };
            Arc::new(KafkaSink::new(kafka_config)?)
        }
        #[cfg(not(feature = "kafka"))]
        "kafka" => {
            return Err(ServerError::Config(
                "sink backend \"kafka\" requires the `kafka` feature".into(),
            ));
        }
        other => {
            return Err(ServerError::Config(format!(
                "unknown sink backend: {other:?} (expected \"log\", \"memory\" or \"kafka\")"
            )));
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_log() {
        let sink = create_sink(&GatekeeperConfig::default()).unwrap();
        assert_eq!(sink.name(), "log");
    }

    #[test]
    fn memory_backend() {
        let config = GatekeeperConfig::parse("[sink]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(create_sink(&config).unwrap().name(), "memory");
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let config = GatekeeperConfig::parse("[sink]\nbackend = \"s3\"\n").unwrap();
        let Err(err) = create_sink(&config) else {
            panic!("expected an error");
        };
        assert!(matches!(err, ServerError::Config(_)));
    }
}
