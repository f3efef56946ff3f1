use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use gatekeeper_core::{CaseRef, ChannelName, MinimalRecord, SubjectId};

/// Default number of outcomes remembered per subject.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 50;

/// What happened to a record with respect to one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Published on arrival.
    Forwarded,
    /// Published from the buffer after a grant.
    Replayed,
    /// Kept only in the buffer.
    Withheld,
    /// Publishing was attempted and retries were exhausted.
    Failed,
}

/// One forward/withhold outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub seq: u64,
    pub subject_id: SubjectId,
    /// `None` when no case referenced the subject.
    pub case: Option<CaseRef>,
    pub channel: Option<ChannelName>,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The record as it was (or would have been) delivered. Already redacted.
    pub record: MinimalRecord,
}

/// Last N outcomes per subject, for dashboards.
#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: DashMap<SubjectId, VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    /// Create a log remembering `capacity` outcomes per subject.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
        }
    }

    /// Append an outcome, dropping the oldest for that subject when full.
    pub fn record(&self, entry: ActivityEntry) {
        let mut log = self.entries.entry(entry.subject_id.clone()).or_default();
        log.push_back(entry);
        while log.len() > self.capacity {
            log.pop_front();
        }
    }

    /// Recent outcomes for `subject_id`, oldest first.
    pub fn recent(&self, subject_id: &SubjectId) -> Vec<ActivityEntry> {
        self.entries
            .get(subject_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recent outcomes for `subject_id` with the given disposition.
    pub fn recent_with(
        &self,
        subject_id: &SubjectId,
        disposition: Disposition,
    ) -> Vec<ActivityEntry> {
        self.recent(subject_id)
            .into_iter()
            .filter(|entry| entry.disposition == disposition)
            .collect()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64, disposition: Disposition) -> ActivityEntry {
        ActivityEntry {
            at: Utc::now(),
            seq,
            subject_id: SubjectId::new("nhs-999"),
            case: Some(CaseRef::new("dwp", "4711")),
            channel: None,
            disposition,
            reason: None,
            record: MinimalRecord {
                subject_id: SubjectId::new("nhs-999"),
                recorded_at: Utc::now(),
                fields: serde_json::Map::from_iter([(
                    "prescription".to_owned(),
                    serde_json::json!({ "drug": "Amoxicillin" }),
                )]),
            },
        }
    }

    #[test]
    fn keeps_last_n_per_subject() {
        let log = ActivityLog::new(3);
        for seq in 1..=5 {
            log.record(entry(seq, Disposition::Withheld));
        }
        let seqs: Vec<u64> = log
            .recent(&SubjectId::new("nhs-999"))
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn filter_by_disposition() {
        let log = ActivityLog::default();
        log.record(entry(1, Disposition::Withheld));
        log.record(entry(1, Disposition::Replayed));
        log.record(entry(2, Disposition::Forwarded));
        let forwarded = log.recent_with(&SubjectId::new("nhs-999"), Disposition::Forwarded);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].seq, 2);
    }

    #[test]
    fn unknown_subject_has_no_activity() {
        let log = ActivityLog::default();
        assert!(log.recent(&SubjectId::new("nobody")).is_empty());
    }

    #[test]
    fn serializes_disposition_in_snake_case() {
        let json = serde_json::to_value(entry(7, Disposition::Withheld)).unwrap();
        assert_eq!(json["disposition"], "withheld");
        assert!(json.get("reason").is_none());
        assert_eq!(json["record"]["subjectId"], "nhs-999");
        assert_eq!(json["record"]["prescription"]["drug"], "Amoxicillin");
    }

    #[test]
    fn disposition_parses_from_snake_case() {
        let parsed: Disposition = serde_json::from_str("\"replayed\"").unwrap();
        assert_eq!(parsed, Disposition::Replayed);
    }
}
