use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking relay outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Raw records accepted by the engine.
    pub raw_received: AtomicU64,
    /// Consent decisions accepted by the engine.
    pub decisions_received: AtomicU64,
    /// Inbound messages skipped because they could not be decoded.
    pub malformed: AtomicU64,
    /// Records published on arrival.
    pub forwarded: AtomicU64,
    /// Records published from the buffer after a grant.
    pub replayed: AtomicU64,
    /// (record, case) pairs held back for lack of consent.
    pub withheld: AtomicU64,
    /// Publishes that exhausted their retries.
    pub publish_failures: AtomicU64,
    /// Replayed records skipped because the channel already had them.
    pub duplicates_skipped: AtomicU64,
    /// Grant decisions applied.
    pub grants: AtomicU64,
    /// Revoke decisions applied.
    pub revokes: AtomicU64,
    /// Request decisions applied.
    pub requests: AtomicU64,
}

impl RelayMetrics {
    pub fn increment_raw_received(&self) {
        self.raw_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decisions_received(&self) {
        self.decisions_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replayed(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_withheld(&self) {
        self.withheld.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_grants(&self) {
        self.grants.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_revokes(&self) {
        self.revokes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            raw_received: self.raw_received.load(Ordering::Relaxed),
            decisions_received: self.decisions_received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            withheld: self.withheld.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            grants: self.grants.load(Ordering::Relaxed),
            revokes: self.revokes.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`RelayMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    pub raw_received: u64,
    pub decisions_received: u64,
    pub malformed: u64,
    pub forwarded: u64,
    pub replayed: u64,
    pub withheld: u64,
    pub publish_failures: u64,
    pub duplicates_skipped: u64,
    pub grants: u64,
    pub revokes: u64,
    pub requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_zero() {
        assert_eq!(
            RelayMetrics::default().snapshot(),
            RelayMetricsSnapshot::default()
        );
    }

    #[test]
    fn increment_and_snapshot() {
        let m = RelayMetrics::default();
        m.increment_raw_received();
        m.increment_raw_received();
        m.increment_forwarded();
        m.increment_withheld();
        m.increment_duplicates_skipped();
        m.increment_grants();

        let snap = m.snapshot();
        assert_eq!(snap.raw_received, 2);
        assert_eq!(snap.forwarded, 1);
        assert_eq!(snap.withheld, 1);
        assert_eq!(snap.duplicates_skipped, 1);
        assert_eq!(snap.grants, 1);
        assert_eq!(snap.replayed, 0);
        assert_eq!(snap.publish_failures, 0);
    }
}
