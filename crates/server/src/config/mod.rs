mod executor;
mod relay;
mod server;
mod transport;


pub use executor::*;
pub use relay::*;
pub use server::*;
pub use transport::*;

use std::path::Path;

use gatekeeper_core::check_segment;
use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration for the gatekeeper, loaded from a TOML file.
///
/// Every section is optional; an empty file yields a working local setup
/// that tails two JSON-lines files and logs what it would publish.
#[derive(Debug, Default, Deserialize)]
pub struct GatekeeperConfig {
    /// Relay behavior: scope, buffer and inbox sizes.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Field allow-list applied at ingestion.
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Output channel naming and retention.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Publish retry and timeout settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Inbound stream backend.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Output sink backend.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Static subject to case index.
    #[serde(default)]
    pub seed: SeedConfig,
    /// HTTP query surface.
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatekeeperConfig {
    /// Load from `path`, or return all defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Ids that end up in channel names must be usable as name segments.
    fn validate(&self) -> Result<(), ServerError> {
        let segment = |field: &str, value: &str| {
            check_segment(field, value).map_err(|e| ServerError::Config(e.to_string()))
        };
        segment("relay.relying_party", &self.relay.relying_party)?;
        for (subject, cases) in &self.seed.cases {
            segment("seed.cases", subject)?;
            for case_id in cases {
                segment("seed.cases", case_id)?;
            }
        }
        Ok(())
    }
}
