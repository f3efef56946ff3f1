//! In-memory state for the relay: the consent registry, the per-subject
//! event buffer and the recent activity log.

mod activity;
mod buffer;
mod registry;

pub use activity::{ActivityEntry, ActivityLog, DEFAULT_ACTIVITY_CAPACITY, Disposition};
pub use buffer::{Appended, DEFAULT_CAPACITY, EventBuffer};
pub use registry::{ConsentEntry, ConsentRegistry, ConsentView};
