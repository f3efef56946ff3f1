pub mod config;
pub mod executor;
pub mod retry;

pub use config::ExecutorConfig;
pub use executor::{PublishExecutor, PublishOutcome};
pub use retry::RetryStrategy;
