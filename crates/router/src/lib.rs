pub mod error;
pub mod log;
pub mod memory;
pub mod message;
pub mod router;
pub mod sink;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use error::SinkError;
pub use log::LogSink;
pub use memory::{Delivery, MemorySink};
pub use message::OutboundMessage;
pub use router::OutputRouter;
pub use sink::{ChannelSink, DynChannelSink};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSinkConfig};
