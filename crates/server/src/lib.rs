pub mod api;
pub mod config;
pub mod error;
pub mod sink_factory;
pub mod source_factory;
pub mod telemetry;
