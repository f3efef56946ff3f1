use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use gatekeeper_core::{CaseRef, Clock, ConsentKey, ConsentRecord, ConsentStatus, SubjectId};

/// Stored state for one consent key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentEntry {
    pub record: ConsentRecord,
    pub status: ConsentStatus,
    /// Scopes named by the most recent `request`, for display only.
    pub requested_scopes: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time view of one registry entry, as served to dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentView {
    pub key: ConsentKey,
    pub status: ConsentStatus,
    /// `true` when the record is granted but past its expiry.
    pub expired: bool,
    pub record: ConsentRecord,
    pub requested_scopes: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

/// Keyed store of current consent decisions.
///
/// Holds at most one record per [`ConsentKey`]; every write replaces the
/// previous record. Records are never removed, so revoked keys stay
/// queryable. Also maintains the subject → cases index used to fan raw
/// records out to every case that references a subject.
#[derive(Debug)]
pub struct ConsentRegistry {
    entries: DashMap<ConsentKey, ConsentEntry>,
    observed: DashMap<SubjectId, BTreeSet<CaseRef>>,
    seeded: DashMap<SubjectId, BTreeSet<CaseRef>>,
    clock: Arc<dyn Clock>,
}

impl ConsentRegistry {
    /// Create an empty registry that evaluates expiry against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            observed: DashMap::new(),
            seeded: DashMap::new(),
            clock,
        }
    }

    /// Register a static subject → case association.
    ///
    /// Seeded cases take part in fan-out even before any consent event has
    /// been seen for them.
    pub fn seed_case(&self, subject_id: SubjectId, case: CaseRef) {
        self.seeded.entry(subject_id).or_default().insert(case);
    }

    /// Replace the record for `key`. The new record is visible to the next
    /// query.
    pub fn upsert(&self, key: ConsentKey, record: ConsentRecord) {
        let status = if record.active {
            ConsentStatus::Granted
        } else {
            ConsentStatus::Revoked
        };
        self.index(&key);
        let now = self.clock.now();
        self.entries
            .entry(key)
            .and_modify(|entry| {
                entry.record = record.clone();
                entry.status = status;
                entry.updated_at = now;
            })
            .or_insert_with(|| ConsentEntry {
                record,
                status,
                requested_scopes: BTreeSet::new(),
                updated_at: now,
            });
    }

    /// Record that consent was requested for `key`.
    ///
    /// Creates an inactive entry for unseen keys. Existing records are left
    /// untouched; a request never changes eligibility. A key that is
    /// currently granted keeps its `granted` status.
    pub fn mark_requested(&self, key: ConsentKey, scopes: BTreeSet<String>) {
        self.index(&key);
        let now = self.clock.now();
        self.entries
            .entry(key)
            .and_modify(|entry| {
                if entry.status != ConsentStatus::Granted {
                    entry.status = ConsentStatus::Requested;
                }
                entry.requested_scopes.clone_from(&scopes);
                entry.updated_at = now;
            })
            .or_insert_with(|| ConsentEntry {
                record: ConsentRecord::pending(),
                status: ConsentStatus::Requested,
                requested_scopes: scopes,
                updated_at: now,
            });
    }

    /// Current record for `key`, or `None` for keys never seen.
    pub fn query(&self, key: &ConsentKey) -> Option<ConsentRecord> {
        self.entries.get(key).map(|entry| entry.record.clone())
    }

    /// Full stored entry for `key`.
    pub fn entry(&self, key: &ConsentKey) -> Option<ConsentEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stored lifecycle status for `key`.
    pub fn status(&self, key: &ConsentKey) -> ConsentStatus {
        self.entries
            .get(key)
            .map_or(ConsentStatus::NotRequested, |entry| entry.status)
    }

    /// Whether a record may be delivered under `key` for `scope` right now.
    ///
    /// Reads the clock on every call; nothing is cached.
    pub fn is_eligible(&self, key: &ConsentKey, scope: &str) -> bool {
        self.is_eligible_at(key, scope, self.clock.now())
    }

    /// [`is_eligible`](Self::is_eligible) evaluated at an explicit instant.
    pub fn is_eligible_at(&self, key: &ConsentKey, scope: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.record.permits(scope, now))
    }

    /// Every case known to reference `subject_id`, from observed consent
    /// keys of any status plus static seed data.
    pub fn cases_for_subject(&self, subject_id: &SubjectId) -> BTreeSet<CaseRef> {
        let mut cases = self
            .observed
            .get(subject_id)
            .map(|cases| cases.value().clone())
            .unwrap_or_default();
        if let Some(seeded) = self.seeded.get(subject_id) {
            cases.extend(seeded.value().iter().cloned());
        }
        cases
    }

    /// Number of stored consent entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no consent entry has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, ordered by key.
    pub fn snapshot(&self) -> Vec<ConsentView> {
        let now = self.clock.now();
        let mut views: Vec<ConsentView> = self
            .entries
            .iter()
            .map(|entry| {
                let stored = entry.value();
                ConsentView {
                    key: entry.key().clone(),
                    status: stored.status,
                    expired: stored.status == ConsentStatus::Granted
                        && stored.record.is_expired_at(now),
                    record: stored.record.clone(),
                    requested_scopes: stored.requested_scopes.clone(),
                    updated_at: stored.updated_at,
                }
            })
            .collect();
        views.sort_by(|a, b| a.key.cmp(&b.key));
        views
    }

    fn index(&self, key: &ConsentKey) {
        self.observed
            .entry(key.subject_id.clone())
            .or_default()
            .insert(key.case_ref());
    }
}
