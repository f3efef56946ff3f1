use std::sync::Arc;
use std::time::Duration;

use gatekeeper_core::{CaseRef, Clock, RedactionPolicy, SubjectId, SystemClock};
use gatekeeper_executor::{ExecutorConfig, PublishExecutor};
use gatekeeper_router::{DynChannelSink, OutputRouter};
use gatekeeper_state::{
    ActivityLog, ConsentRegistry, DEFAULT_ACTIVITY_CAPACITY, DEFAULT_CAPACITY, EventBuffer,
};

use crate::engine::RelayEngine;
use crate::error::RelayError;

/// Default scope a grant must contain.
pub const DEFAULT_REQUIRED_SCOPE: &str = "prescriptions";
/// Default prefix for output channel names.
pub const DEFAULT_CHANNEL_PREFIX: &str = "views.permitted";

/// Builder for constructing a [`RelayEngine`].
///
/// Only the sink is required; everything else has a default.
pub struct RelayBuilder {
    sink: Option<Arc<dyn DynChannelSink>>,
    policy: RedactionPolicy,
    required_scope: String,
    buffer_capacity: usize,
    activity_capacity: usize,
    channel_prefix: String,
    retention: Option<Duration>,
    executor_config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    seeds: Vec<(SubjectId, CaseRef)>,
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            sink: None,
            policy: RedactionPolicy::default(),
            required_scope: DEFAULT_REQUIRED_SCOPE.to_owned(),
            buffer_capacity: DEFAULT_CAPACITY,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_owned(),
            retention: None,
            executor_config: ExecutorConfig::default(),
            clock: Arc::new(SystemClock),
            seeds: Vec::new(),
        }
    }

    /// Set the output sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DynChannelSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn redaction(mut self, policy: RedactionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = scope.into();
        self
    }

    /// Records kept per subject for replay.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Outcomes remembered per subject for the activity view.
    #[must_use]
    pub fn activity_capacity(mut self, capacity: usize) -> Self {
        self.activity_capacity = capacity;
        self
    }

    #[must_use]
    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Retention requested for provisioned channels.
    #[must_use]
    pub fn channel_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Clock used for expiry checks and timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a static subject → case association.
    #[must_use]
    pub fn seed_case(mut self, subject_id: impl Into<SubjectId>, case: CaseRef) -> Self {
        self.seeds.push((subject_id.into(), case));
        self
    }

    /// Consume the builder and produce a configured [`RelayEngine`].
    ///
    /// Returns [`RelayError::Configuration`] when no sink was set or the
    /// required scope is blank.
    pub fn build(self) -> Result<RelayEngine, RelayError> {
        let sink = self
            .sink
            .ok_or_else(|| RelayError::Configuration("an output sink is required".into()))?;

        let required_scope = self.required_scope.trim().to_owned();
        if required_scope.is_empty() {
            return Err(RelayError::Configuration(
                "required scope must not be empty".into(),
            ));
        }

        let registry = Arc::new(ConsentRegistry::new(Arc::clone(&self.clock)));
        for (subject_id, case) in self.seeds {
            registry.seed_case(subject_id, case);
        }

        let mut router = OutputRouter::new(sink, self.channel_prefix);
        if let Some(retention) = self.retention {
            router = router.with_retention(retention);
        }

        Ok(RelayEngine::new(
            registry,
            Arc::new(EventBuffer::new(self.buffer_capacity)),
            Arc::new(ActivityLog::new(self.activity_capacity)),
            Arc::new(router),
            PublishExecutor::new(self.executor_config),
            self.policy,
            required_scope,
            self.clock,
        ))
    }
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
