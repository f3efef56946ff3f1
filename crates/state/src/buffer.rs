use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use gatekeeper_core::{BufferedRecord, MinimalRecord, SubjectId};

/// Default number of records kept per subject.
pub const DEFAULT_CAPACITY: usize = 20;

/// Result of appending to the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    /// The entry as stored, with its assigned sequence number.
    pub entry: BufferedRecord,
    /// The oldest entry, if the append pushed the subject over capacity.
    pub evicted: Option<BufferedRecord>,
}

/// Bounded per-subject FIFO of minimized records awaiting a permission
/// decision.
///
/// Every raw record is buffered regardless of consent state. Length per
/// subject never exceeds the capacity; the oldest entry is evicted first.
/// Reads are snapshots and never remove entries.
#[derive(Debug)]
pub struct EventBuffer {
    capacity: usize,
    queues: DashMap<SubjectId, VecDeque<BufferedRecord>>,
    next_seq: AtomicU64,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` records per subject.
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Maximum records kept per subject.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push `record` to the tail of the subject's queue, evicting from the
    /// head when over capacity.
    pub fn append(
        &self,
        subject_id: &SubjectId,
        record: MinimalRecord,
        received_at: DateTime<Utc>,
    ) -> Appended {
        let entry = BufferedRecord {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            received_at,
            record,
        };

        let mut queue = self.queues.entry(subject_id.clone()).or_default();
        queue.push_back(entry.clone());
        let evicted = if queue.len() > self.capacity {
            queue.pop_front()
        } else {
            None
        };

        Appended { entry, evicted }
    }

    /// Snapshot of the subject's buffered records in arrival order.
    ///
    /// Non-destructive: a later call returns the same history.
    pub fn drain(&self, subject_id: &SubjectId) -> Vec<BufferedRecord> {
        self.queues
            .get(subject_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records buffered for `subject_id`.
    pub fn len(&self, subject_id: &SubjectId) -> usize {
        self.queues.get(subject_id).map_or(0, |queue| queue.len())
    }

    /// Buffer length for every subject seen so far.
    pub fn sizes(&self) -> BTreeMap<SubjectId, usize> {
        self.queues
            .iter()
            .map(|queue| (queue.key().clone(), queue.len()))
            .collect()
    }

    /// Total records buffered across all subjects.
    pub fn total(&self) -> usize {
        self.queues.iter().map(|queue| queue.len()).sum()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn record(subject: &str, n: u64) -> MinimalRecord {
        let mut fields = Map::new();
        fields.insert("n".into(), n.into());
        MinimalRecord {
            subject_id: SubjectId::new(subject),
            recorded_at: Utc::now(),
            fields,
        }
    }

    fn numbers(entries: &[BufferedRecord]) -> Vec<u64> {
        entries
            .iter()
            .map(|e| e.record.fields["n"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn empty_subject_drains_nothing() {
        let buffer = EventBuffer::default();
        let subject = SubjectId::new("nhs-999");
        assert!(buffer.drain(&subject).is_empty());
        assert_eq!(buffer.len(&subject), 0);
    }

    #[test]
    fn append_keeps_arrival_order() {
        let buffer = EventBuffer::default();
        let subject = SubjectId::new("nhs-999");
        for n in 1..=3 {
            let appended = buffer.append(&subject, record("nhs-999", n), Utc::now());
            assert!(appended.evicted.is_none());
        }
        assert_eq!(numbers(&buffer.drain(&subject)), vec![1, 2, 3]);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let buffer = EventBuffer::default();
        let subject = SubjectId::new("nhs-999");
        let mut evicted = Vec::new();
        for n in 1..=21 {
            let appended = buffer.append(&subject, record("nhs-999", n), Utc::now());
            evicted.extend(appended.evicted);
            assert!(buffer.len(&subject) <= DEFAULT_CAPACITY);
        }

        let drained = buffer.drain(&subject);
        assert_eq!(drained.len(), 20);
        assert_eq!(numbers(&drained), (2..=21).collect::<Vec<_>>());
        assert_eq!(numbers(&evicted), vec![1]);
    }

    #[test]
    fn drain_is_non_destructive() {
        let buffer = EventBuffer::new(5);
        let subject = SubjectId::new("nhs-999");
        buffer.append(&subject, record("nhs-999", 1), Utc::now());
        assert_eq!(buffer.drain(&subject).len(), 1);
        assert_eq!(buffer.drain(&subject).len(), 1);
    }

    #[test]
    fn sequence_numbers_increase_across_subjects() {
        let buffer = EventBuffer::default();
        let a = buffer.append(&SubjectId::new("a"), record("a", 1), Utc::now());
        let b = buffer.append(&SubjectId::new("b"), record("b", 1), Utc::now());
        assert!(b.entry.seq > a.entry.seq);
    }

    #[test]
    fn subjects_are_bounded_independently() {
        let buffer = EventBuffer::new(2);
        for n in 1..=3 {
            buffer.append(&SubjectId::new("a"), record("a", n), Utc::now());
        }
        buffer.append(&SubjectId::new("b"), record("b", 1), Utc::now());

        let sizes = buffer.sizes();
        assert_eq!(sizes[&SubjectId::new("a")], 2);
        assert_eq!(sizes[&SubjectId::new("b")], 1);
        assert_eq!(buffer.total(), 3);
        assert_eq!(buffer.drain(&SubjectId::new("a"))[0].seq, 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buffer = EventBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }
}
