//! The consent-gated relay.
//!
//! [`RelayEngine`] holds consent state and the per-subject buffer and
//! decides, for every record, whether it is forwarded now, held, or
//! replayed later. A [`RelayWorker`] owns the engine and applies inbox
//! messages one at a time; [`RawEventIngester`] and
//! [`ConsentEventIngester`] feed that inbox from the two inbound streams.

pub mod builder;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod view;
pub mod worker;

pub use builder::{DEFAULT_CHANNEL_PREFIX, DEFAULT_REQUIRED_SCOPE, RelayBuilder};
pub use engine::{DecisionOutcome, RawOutcome, RelayEngine, ReplaySummary};
pub use error::RelayError;
pub use ingest::{ConsentEventIngester, IngestSnapshot, IngestStatus, RawEventIngester};
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
pub use view::{ChannelView, RelayStateView, RelayView};
pub use worker::{DEFAULT_INBOX_CAPACITY, Inbound, RelayHandle, RelayWorker};
