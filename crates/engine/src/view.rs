use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gatekeeper_core::{CaseRef, ChannelName, ConsentKey, SubjectId};
use gatekeeper_router::OutputRouter;
use gatekeeper_state::{
    ActivityEntry, ActivityLog, ConsentRegistry, ConsentView, Disposition, EventBuffer,
};
use serde::Serialize;

use crate::engine::RelayEngine;
use crate::ingest::{IngestSnapshot, IngestStatus};
use crate::metrics::{RelayMetrics, RelayMetricsSnapshot};

/// A provisioned output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    pub key: ConsentKey,
    pub channel: ChannelName,
}

/// Summary of relay state for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStateView {
    pub ready: bool,
    pub required_scope: String,
    pub channel_prefix: String,
    pub sink: String,
    pub buffer_capacity: usize,
    pub consents: usize,
    pub buffered_records: usize,
    pub channels: usize,
    pub counters: RelayMetricsSnapshot,
    pub ingest: Vec<IngestSnapshot>,
}

/// Read-only accessors over the relay's in-memory state.
///
/// Cheap to clone and safe to share with request handlers; it never
/// mutates anything.
#[derive(Clone)]
pub struct RelayView {
    registry: Arc<ConsentRegistry>,
    buffer: Arc<EventBuffer>,
    activity: Arc<ActivityLog>,
    router: Arc<OutputRouter>,
    metrics: Arc<RelayMetrics>,
    raw_status: Arc<IngestStatus>,
    consent_status: Arc<IngestStatus>,
    required_scope: String,
}

impl RelayView {
    pub(crate) fn from_engine(engine: &RelayEngine) -> Self {
        Self {
            registry: Arc::clone(&engine.registry),
            buffer: Arc::clone(&engine.buffer),
            activity: Arc::clone(&engine.activity),
            router: Arc::clone(&engine.router),
            metrics: Arc::clone(&engine.metrics),
            raw_status: Arc::clone(&engine.raw_status),
            consent_status: Arc::clone(&engine.consent_status),
            required_scope: engine.required_scope.clone(),
        }
    }

    /// Every consent entry, ordered by key.
    pub fn consents(&self) -> Vec<ConsentView> {
        self.registry.snapshot()
    }

    /// Buffered record count per subject.
    pub fn buffer_sizes(&self) -> BTreeMap<SubjectId, usize> {
        self.buffer.sizes()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Recent forward/withhold outcomes for a subject, oldest first.
    pub fn activity(&self, subject_id: &SubjectId) -> Vec<ActivityEntry> {
        self.activity.recent(subject_id)
    }

    /// Recent outcomes for a subject with one disposition only.
    pub fn activity_with(
        &self,
        subject_id: &SubjectId,
        disposition: Disposition,
    ) -> Vec<ActivityEntry> {
        self.activity.recent_with(subject_id, disposition)
    }

    pub fn cases_for_subject(&self, subject_id: &SubjectId) -> BTreeSet<CaseRef> {
        self.registry.cases_for_subject(subject_id)
    }

    /// Channels provisioned so far, ordered by key.
    pub fn channels(&self) -> Vec<ChannelView> {
        self.router
            .channels()
            .into_iter()
            .map(|(key, channel)| ChannelView { key, channel })
            .collect()
    }

    pub fn channel_prefix(&self) -> &str {
        self.router.prefix()
    }

    pub fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Status cell updated by the raw-record ingester.
    pub fn raw_status(&self) -> Arc<IngestStatus> {
        Arc::clone(&self.raw_status)
    }

    /// Status cell updated by the consent-decision ingester.
    pub fn consent_status(&self) -> Arc<IngestStatus> {
        Arc::clone(&self.consent_status)
    }

    /// Both inbound streams are connected.
    pub fn is_ready(&self) -> bool {
        self.raw_status.is_connected() && self.consent_status.is_connected()
    }

    /// Aggregate summary for the state endpoint.
    pub fn state(&self) -> RelayStateView {
        RelayStateView {
            ready: self.is_ready(),
            required_scope: self.required_scope.clone(),
            channel_prefix: self.router.prefix().to_owned(),
            sink: self.router.sink_name().to_owned(),
            buffer_capacity: self.buffer.capacity(),
            consents: self.registry.len(),
            buffered_records: self.buffer.total(),
            channels: self.router.channels().len(),
            counters: self.metrics.snapshot(),
            ingest: vec![self.raw_status.snapshot(), self.consent_status.snapshot()],
        }
    }
}
