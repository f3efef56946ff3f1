//! Inbound stream sources.
//!
//! A source yields raw message payloads in arrival order. Decoding is left
//! to the caller so a malformed message can be skipped without touching the
//! transport.

pub mod channel;
pub mod error;
pub mod lines;
pub mod source;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::{ChannelSource, SourceSender};
pub use error::TransportError;
pub use lines::JsonLinesSource;
pub use source::{EventSource, consumer_group};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSource, KafkaSourceConfig};
