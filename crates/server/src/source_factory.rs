#[cfg(feature = "kafka")]
use gatekeeper_transport::{KafkaSource, KafkaSourceConfig, consumer_group};
use gatekeeper_transport::{EventSource, JsonLinesSource};
use tracing::info;

use crate::config::TransportConfig;
use crate::error::ServerError;

/// The two inbound streams, not yet connected.
pub struct Sources {
    pub raw: Box<dyn EventSource>,
    pub consent: Box<dyn EventSource>,
}

/// Create both inbound sources from `[transport]`.
pub fn create_sources(config: &TransportConfig) -> Result<Sources, ServerError> {
    match config.backend.as_str() {
        "lines" => {
            info!(
                raw = %config.raw_path,
                consent = %config.consent_path,
                follow = config.follow,
                "reading inbound streams from files"
            );
            Ok(Sources {
                raw: Box::new(lines_source("raw", &config.raw_path, config)),
                consent: Box::new(lines_source("consent", &config.consent_path, config)),
            })
        }
        #[cfg(feature = "kafka")]
        "kafka" => {
            let source = |stream: &str, topic: &str| {
                let group_id = consumer_group(&config.group_id, stream, config.run_id.as_deref());
                info!(stream, topic, group_id = %group_id, "subscribing to kafka topic");
                KafkaSource::new(
                    stream,
                    KafkaSourceConfig {
                        brokers: config.brokers.clone(),
                        topic: topic.to_owned(),
                        group_id,
                        offset_reset: config.offset_reset.clone(),
                    },
                )
            };
            Ok(Sources {
                raw: Box::new(source("raw", &config.raw_topic)),
                consent: Box::new(source("consent", &config.consent_topic)),
            })
        }
        #[cfg(not(feature = "kafka"))]
        "kafka" => Err(ServerError::Config(
            "transport backend \"kafka\" requires the `kafka` feature".into(),
        )),
        other => Err(ServerError::Config(format!(
            "unknown transport backend: {other:?} (expected \"lines\" or \"kafka\")"
        ))),
    }
}

fn lines_source(name: &str, path: &str, config: &TransportConfig) -> JsonLinesSource {
    let source = JsonLinesSource::new(name, path);
    if config.follow {
        source.follow(config.poll_interval())
    } else {
        source
    }
}
