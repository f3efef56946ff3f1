use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_core::{
    BufferedRecord, CaseRef, Clock, ConsentDecision, ConsentKey, ConsentRecord, ConsentStatus,
    DecisionKind, RawRecord, RedactionPolicy, SubjectId,
};
use gatekeeper_executor::{PublishExecutor, PublishOutcome};
use gatekeeper_router::OutputRouter;
use gatekeeper_state::{ActivityEntry, ActivityLog, ConsentRegistry, Disposition, EventBuffer};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::ingest::IngestStatus;
use crate::metrics::RelayMetrics;
use crate::view::RelayView;

/// What happened to one raw record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawOutcome {
    /// Buffer sequence number assigned to the record.
    pub seq: u64,
    pub forwarded: usize,
    pub withheld: usize,
    pub failed: usize,
}

/// Counts for one replay batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Buffered records considered.
    pub considered: usize,
    pub replayed: usize,
    /// Already delivered to this channel by an earlier forward or replay.
    pub duplicates: usize,
    /// No longer eligible when their turn came.
    pub withheld: usize,
    pub failed: usize,
}

/// What happened to one consent decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub kind: DecisionKind,
    pub key: ConsentKey,
    /// Present for grants only.
    pub replay: Option<ReplaySummary>,
}

/// One buffered record scheduled for redelivery under a key.
#[derive(Debug, Clone)]
struct ReplayTask {
    key: ConsentKey,
    entry: BufferedRecord,
}

/// How a single publish ended, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Delivered,
    Withheld,
    Failed,
}

/// The relay state machine.
///
/// Owns the consent registry, the event buffer and the delivery ledger, and
/// is driven by exactly one task at a time (see
/// [`RelayWorker`](crate::RelayWorker)). Read-only views of its state are
/// available through [`RelayView`].
pub struct RelayEngine {
    pub(crate) registry: Arc<ConsentRegistry>,
    pub(crate) buffer: Arc<EventBuffer>,
    pub(crate) activity: Arc<ActivityLog>,
    pub(crate) router: Arc<OutputRouter>,
    pub(crate) executor: PublishExecutor,
    pub(crate) policy: RedactionPolicy,
    pub(crate) required_scope: String,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<RelayMetrics>,
    pub(crate) raw_status: Arc<IngestStatus>,
    pub(crate) consent_status: Arc<IngestStatus>,
    /// Buffer sequence numbers already delivered, per subject and case.
    ledger: HashMap<SubjectId, HashMap<CaseRef, BTreeSet<u64>>>,
    replay_queue: VecDeque<ReplayTask>,
}

impl RelayEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: Arc<ConsentRegistry>,
        buffer: Arc<EventBuffer>,
        activity: Arc<ActivityLog>,
        router: Arc<OutputRouter>,
        executor: PublishExecutor,
        policy: RedactionPolicy,
        required_scope: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            buffer,
            activity,
            router,
            executor,
            policy,
            required_scope,
            clock,
            metrics: Arc::new(RelayMetrics::default()),
            raw_status: Arc::new(IngestStatus::new("raw")),
            consent_status: Arc::new(IngestStatus::new("consent")),
            ledger: HashMap::new(),
            replay_queue: VecDeque::new(),
        }
    }

    /// Read-only handle onto the engine's state for dashboards.
    pub fn view(&self) -> RelayView {
        RelayView::from_engine(self)
    }

    /// The redaction policy applied at ingestion.
    pub fn policy(&self) -> &RedactionPolicy {
        &self.policy
    }

    /// Counters shared with the ingesters.
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Scope a grant must contain for records to be delivered.
    pub fn required_scope(&self) -> &str {
        &self.required_scope
    }

    /// Handle one raw record.
    ///
    /// The record is redacted, buffered unconditionally, then published to
    /// every case that currently holds an eligible grant for its subject.
    /// Each case is an independent unit of work.
    #[instrument(skip(self, raw), fields(subject_id = %raw.subject_id))]
    pub async fn on_raw_record(&mut self, raw: RawRecord) -> RawOutcome {
        self.metrics.increment_raw_received();

        let minimal = self.policy.minimize(&raw);
        let subject_id = raw.subject_id;
        let appended = self
            .buffer
            .append(&subject_id, minimal, self.clock.now());
        if let Some(evicted) = &appended.evicted {
            self.prune_ledger(&subject_id, evicted.seq);
        }
        let entry = appended.entry;

        let mut outcome = RawOutcome {
            seq: entry.seq,
            ..RawOutcome::default()
        };

        let cases = self.registry.cases_for_subject(&subject_id);
        if cases.is_empty() {
            debug!(seq = entry.seq, "no case references subject, record buffered");
            self.metrics.increment_withheld();
            self.activity.record(ActivityEntry {
                at: self.clock.now(),
                seq: entry.seq,
                subject_id: subject_id.clone(),
                case: None,
                channel: None,
                disposition: Disposition::Withheld,
                reason: Some("no_case".into()),
                record: entry.record.clone(),
            });
            outcome.withheld += 1;
            return outcome;
        }

        for case in cases {
            let key = ConsentKey::for_case(&case, &subject_id);
            if !self.registry.is_eligible(&key, &self.required_scope) {
                let reason = self.withhold_reason(&key, self.clock.now());
                debug!(case = %case, seq = entry.seq, reason, "record withheld");
                self.metrics.increment_withheld();
                self.record_activity(&key, &entry, Disposition::Withheld, Some(reason.into()));
                outcome.withheld += 1;
                continue;
            }

            let result = self.publish_checked(&key, &entry).await;
            match self.settle(&key, &entry, &result, Disposition::Forwarded) {
                Settled::Delivered => {
                    self.metrics.increment_forwarded();
                    outcome.forwarded += 1;
                }
                Settled::Withheld => outcome.withheld += 1,
                Settled::Failed => outcome.failed += 1,
            }
        }

        outcome
    }

    /// Apply one consent decision.
    ///
    /// A grant replaces the stored record and then replays the subject's
    /// buffer to the key's channel before returning. A revoke replaces the
    /// stored record with an inactive one and never recalls prior output.
    #[instrument(
        skip(self, decision),
        fields(kind = %decision.event_type, key = %decision.key())
    )]
    pub async fn on_consent_decision(&mut self, decision: ConsentDecision) -> DecisionOutcome {
        self.metrics.increment_decisions_received();
        let key = decision.key();

        let replay = match decision.event_type {
            DecisionKind::Request => {
                self.metrics.increment_requests();
                self.registry.mark_requested(key.clone(), decision.scopes);
                info!("consent requested");
                None
            }
            DecisionKind::Revoke => {
                self.metrics.increment_revokes();
                self.registry.upsert(key.clone(), ConsentRecord::revoked());
                info!("consent revoked");
                None
            }
            DecisionKind::Grant => {
                self.metrics.increment_grants();
                let record = ConsentRecord::granted(decision.scopes, decision.expires_at);
                if record.is_expired_at(self.clock.now()) {
                    warn!(
                        expires_at = ?decision.expires_at,
                        "grant is already expired, nothing will be delivered"
                    );
                }
                self.registry.upsert(key.clone(), record);
                self.enqueue_replay(&key);
                Some(self.run_replays().await)
            }
        };

        DecisionOutcome {
            kind: decision.event_type,
            key,
            replay,
        }
    }

    fn enqueue_replay(&mut self, key: &ConsentKey) {
        let entries = self.buffer.drain(&key.subject_id);
        debug!(key = %key, records = entries.len(), "replay scheduled");
        self.replay_queue
            .extend(entries.into_iter().map(|entry| ReplayTask {
                key: key.clone(),
                entry,
            }));
    }

    /// Work through the replay queue in order until it is empty.
    ///
    /// Eligibility is re-read for every task, so a grant that expires part
    /// way through only lets the earlier records through.
    async fn run_replays(&mut self) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        while let Some(task) = self.replay_queue.pop_front() {
            summary.considered += 1;
            let ReplayTask { key, entry } = task;

            if self.is_delivered(&key, entry.seq) {
                self.metrics.increment_duplicates_skipped();
                summary.duplicates += 1;
                continue;
            }

            if !self.registry.is_eligible(&key, &self.required_scope) {
                let reason = self.withhold_reason(&key, self.clock.now());
                self.metrics.increment_withheld();
                self.record_activity(&key, &entry, Disposition::Withheld, Some(reason.into()));
                summary.withheld += 1;
                continue;
            }

            let result = self.publish_checked(&key, &entry).await;
            match self.settle(&key, &entry, &result, Disposition::Replayed) {
                Settled::Delivered => {
                    self.metrics.increment_replayed();
                    summary.replayed += 1;
                }
                Settled::Withheld => summary.withheld += 1,
                Settled::Failed => summary.failed += 1,
            }
        }

        info!(
            considered = summary.considered,
            replayed = summary.replayed,
            duplicates = summary.duplicates,
            withheld = summary.withheld,
            failed = summary.failed,
            "replay complete"
        );
        summary
    }

    /// Publish one entry under `key`, re-checking eligibility before every
    /// attempt so a grant that lapses during retries stops the delivery.
    async fn publish_checked(&self, key: &ConsentKey, entry: &BufferedRecord) -> PublishOutcome {
        let registry = &self.registry;
        let scope = self.required_scope.as_str();
        self.executor
            .publish_while(&self.router, key, &entry.record, || {
                registry.is_eligible(key, scope)
            })
            .await
    }

    /// Record the result of a publish.
    fn settle(
        &mut self,
        key: &ConsentKey,
        entry: &BufferedRecord,
        result: &PublishOutcome,
        delivered_as: Disposition,
    ) -> Settled {
        match result {
            PublishOutcome::Delivered { channel, attempts } => {
                debug!(channel = %channel, seq = entry.seq, attempts, "record delivered");
                self.mark_delivered(key, entry.seq);
                self.record_activity(key, entry, delivered_as, None);
                Settled::Delivered
            }
            PublishOutcome::Withdrawn { attempts, .. } => {
                let reason = self.withhold_reason(key, self.clock.now());
                debug!(
                    seq = entry.seq,
                    attempts,
                    reason,
                    "consent lapsed during publish, record withheld"
                );
                self.metrics.increment_withheld();
                self.record_activity(key, entry, Disposition::Withheld, Some(reason.into()));
                Settled::Withheld
            }
            PublishOutcome::Failed { error, .. } => {
                self.metrics.increment_publish_failures();
                self.record_activity(
                    key,
                    entry,
                    Disposition::Failed,
                    Some(format!("{}: {error}", error.code())),
                );
                Settled::Failed
            }
        }
    }

    fn record_activity(
        &self,
        key: &ConsentKey,
        entry: &BufferedRecord,
        disposition: Disposition,
        reason: Option<String>,
    ) {
        self.activity.record(ActivityEntry {
            at: self.clock.now(),
            seq: entry.seq,
            subject_id: key.subject_id.clone(),
            case: Some(key.case_ref()),
            channel: Some(self.router.channel_for(key)),
            disposition,
            reason,
            record: entry.record.clone(),
        });
    }

    fn withhold_reason(&self, key: &ConsentKey, now: DateTime<Utc>) -> &'static str {
        let Some(entry) = self.registry.entry(key) else {
            return "no_consent";
        };
        match entry.status {
            ConsentStatus::NotRequested => "no_consent",
            ConsentStatus::Requested => "requested",
            ConsentStatus::Revoked => "revoked",
            ConsentStatus::Granted if entry.record.is_expired_at(now) => "expired",
            ConsentStatus::Granted => "scope_not_granted",
        }
    }

    fn is_delivered(&self, key: &ConsentKey, seq: u64) -> bool {
        self.ledger
            .get(&key.subject_id)
            .and_then(|cases| cases.get(&key.case_ref()))
            .is_some_and(|seqs| seqs.contains(&seq))
    }

    fn mark_delivered(&mut self, key: &ConsentKey, seq: u64) {
        self.ledger
            .entry(key.subject_id.clone())
            .or_default()
            .entry(key.case_ref())
            .or_default()
            .insert(seq);
    }

    /// Forget deliveries of records that are no longer buffered.
    fn prune_ledger(&mut self, subject_id: &SubjectId, evicted_seq: u64) {
        if let Some(cases) = self.ledger.get_mut(subject_id) {
            for seqs in cases.values_mut() {
                *seqs = seqs.split_off(&(evicted_seq + 1));
            }
        }
    }

    #[cfg(test)]
    fn ledger_len(&self, key: &ConsentKey) -> usize {
        self.ledger
            .get(&key.subject_id)
            .and_then(|cases| cases.get(&key.case_ref()))
            .map_or(0, BTreeSet::len)
    }
}
