use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{CaseRef, check_segment};
use crate::error::RecordError;
use crate::types::{CaseId, RelyingParty, SubjectId};

/// Identifies one consent relationship: a relying party's case about a subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsentKey {
    pub relying_party: RelyingParty,
    pub case_id: CaseId,
    pub subject_id: SubjectId,
}

impl ConsentKey {
    /// Create a new consent key.
    #[must_use]
    pub fn new(
        relying_party: impl Into<RelyingParty>,
        case_id: impl Into<CaseId>,
        subject_id: impl Into<SubjectId>,
    ) -> Self {
        Self {
            relying_party: relying_party.into(),
            case_id: case_id.into(),
            subject_id: subject_id.into(),
        }
    }

    /// Build a key from a case reference and the subject it concerns.
    #[must_use]
    pub fn for_case(case: &CaseRef, subject_id: &SubjectId) -> Self {
        Self {
            relying_party: case.relying_party.clone(),
            case_id: case.case_id.clone(),
            subject_id: subject_id.clone(),
        }
    }

    /// The `(relying party, case)` half of the key.
    #[must_use]
    pub fn case_ref(&self) -> CaseRef {
        CaseRef::new(self.relying_party.clone(), self.case_id.clone())
    }

    /// Return the canonical string form: `relying_party|case_id|subject_id`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}",
            self.relying_party, self.case_id, self.subject_id
        )
    }
}

impl std::fmt::Display for ConsentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// The current consent decision for a [`ConsentKey`].
///
/// A new decision replaces the previous record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub active: bool,
    pub scopes: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// An active grant over `scopes`, optionally bounded by `expires_at`.
    #[must_use]
    pub fn granted(scopes: BTreeSet<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            active: true,
            scopes,
            expires_at,
        }
    }

    /// The record stored on revocation: inactive, no scopes, expired at the epoch.
    #[must_use]
    pub fn revoked() -> Self {
        Self {
            active: false,
            scopes: BTreeSet::new(),
            expires_at: Some(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Placeholder record created by a `request` before any grant.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            active: false,
            scopes: BTreeSet::new(),
            expires_at: None,
        }
    }

    /// Whether the record has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether a record may be delivered under this consent for `scope` at `now`.
    #[must_use]
    pub fn permits(&self, scope: &str, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired_at(now) && self.scopes.contains(scope)
    }
}

/// Stored lifecycle position of a consent key, surfaced to dashboards.
///
/// `Requested` never enables delivery. Expiry is not a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    NotRequested,
    Requested,
    Granted,
    Revoked,
}

impl ConsentStatus {
    /// Return a string representation of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Requested => "requested",
            Self::Granted => "granted",
            Self::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of decision carried by a consent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Request,
    Grant,
    Revoke,
}

impl DecisionKind {
    /// Return a string representation of the decision kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consent event as published by the consent authority.
///
/// Older producers used `rp`, `citizenId` and `at`; those names are accepted
/// as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentDecision {
    pub event_type: DecisionKind,
    #[serde(alias = "rp")]
    pub relying_party: RelyingParty,
    pub case_id: CaseId,
    #[serde(alias = "citizenId")]
    pub subject_id: SubjectId,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(alias = "at")]
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentDecision {
    /// Decode a consent event from raw message bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(RecordError::NotAnObject);
        }
        let decision: Self = serde_json::from_value(value)?;
        check_segment("relyingParty", decision.relying_party.as_str())?;
        check_segment("caseId", decision.case_id.as_str())?;
        check_segment("subjectId", decision.subject_id.as_str())?;
        Ok(decision)
    }

    /// The consent key this decision applies to.
    #[must_use]
    pub fn key(&self) -> ConsentKey {
        ConsentKey {
            relying_party: self.relying_party.clone(),
            case_id: self.case_id.clone(),
            subject_id: self.subject_id.clone(),
        }
    }

    /// Build a grant decision issued at `issued_at`.
    #[must_use]
    pub fn grant(
        key: &ConsentKey,
        scopes: impl IntoIterator<Item = impl Into<String>>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self::build(DecisionKind::Grant, key, scopes, issued_at, expires_at)
    }

    /// Build a revoke decision issued at `issued_at`.
    #[must_use]
    pub fn revoke(key: &ConsentKey, issued_at: DateTime<Utc>) -> Self {
        Self::build(
            DecisionKind::Revoke,
            key,
            std::iter::empty::<String>(),
            issued_at,
            None,
        )
    }

    /// Build a request decision issued at `issued_at`.
    #[must_use]
    pub fn request(
        key: &ConsentKey,
        scopes: impl IntoIterator<Item = impl Into<String>>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self::build(DecisionKind::Request, key, scopes, issued_at, None)
    }

    fn build(
        event_type: DecisionKind,
        key: &ConsentKey,
        scopes: impl IntoIterator<Item = impl Into<String>>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            event_type,
            relying_party: key.relying_party.clone(),
            case_id: key.case_id.clone(),
            subject_id: key.subject_id.clone(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            issued_at,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn scopes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn canonical_key() {
        let key = ConsentKey::new("dwp", "4711", "nhs-999");
        assert_eq!(key.canonical(), "dwp|4711|nhs-999");
        assert_eq!(key.to_string(), key.canonical());
    }

    #[test]
    fn keys_compare_structurally() {
        let a = ConsentKey::new("dwp", "4711", "nhs-999");
        let b = ConsentKey::new("dwp", "4711", "nhs-999");
        let c = ConsentKey::new("dwp", "4712", "nhs-999");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn granted_record_permits_scope_until_expiry() {
        let now = Utc::now();
        let record = ConsentRecord::granted(scopes(&["prescriptions"]), Some(now + Duration::hours(1)));
        assert!(record.permits("prescriptions", now));
        assert!(!record.permits("appointments", now));
        assert!(!record.permits("prescriptions", now + Duration::hours(1)));
    }

    #[test]
    fn granted_without_expiry_never_expires() {
        let record = ConsentRecord::granted(scopes(&["prescriptions"]), None);
        let far_future = Utc::now() + Duration::days(365 * 50);
        assert!(record.permits("prescriptions", far_future));
    }

    #[test]
    fn revoked_record_permits_nothing() {
        let record = ConsentRecord::revoked();
        assert!(!record.active);
        assert!(record.scopes.is_empty());
        assert!(record.is_expired_at(Utc::now()));
        assert!(!record.permits("prescriptions", Utc::now()));
    }

    #[test]
    fn inactive_record_with_scope_is_not_permitted() {
        let mut record = ConsentRecord::granted(scopes(&["prescriptions"]), None);
        record.active = false;
        assert!(!record.permits("prescriptions", Utc::now()));
    }

    #[test]
    fn decode_grant_event() {
        let json = br#"{
            "eventType": "grant",
            "relyingParty": "dwp",
            "caseId": "4711",
            "subjectId": "nhs-999",
            "scopes": ["prescriptions"],
            "issuedAt": "2025-01-01T00:00:00Z",
            "expiresAt": "2025-04-01T00:00:00Z"
        }"#;
        let decision = ConsentDecision::from_slice(json).unwrap();
        assert_eq!(decision.event_type, DecisionKind::Grant);
        assert_eq!(decision.key(), ConsentKey::new("dwp", "4711", "nhs-999"));
        assert!(decision.scopes.contains("prescriptions"));
        assert!(decision.expires_at.is_some());
    }

    #[test]
    fn decode_accepts_legacy_field_names() {
        let json = br#"{
            "eventType": "revoke",
            "rp": "dwp",
            "caseId": "4711",
            "citizenId": "nhs-999",
            "at": "2025-01-01T00:00:00Z"
        }"#;
        let decision = ConsentDecision::from_slice(json).unwrap();
        assert_eq!(decision.event_type, DecisionKind::Revoke);
        assert_eq!(decision.subject_id.as_str(), "nhs-999");
        assert!(decision.scopes.is_empty());
        assert!(decision.expires_at.is_none());
    }

    #[test]
    fn decode_rejects_unknown_event_type() {
        let json = br#"{
            "eventType": "approve",
            "relyingParty": "dwp",
            "caseId": "4711",
            "subjectId": "nhs-999",
            "issuedAt": "2025-01-01T00:00:00Z"
        }"#;
        assert!(matches!(
            ConsentDecision::from_slice(json),
            Err(RecordError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_missing_case() {
        let json = br#"{
            "eventType": "grant",
            "relyingParty": "dwp",
            "subjectId": "nhs-999",
            "issuedAt": "2025-01-01T00:00:00Z"
        }"#;
        assert!(ConsentDecision::from_slice(json).is_err());
    }

    #[test]
    fn decode_rejects_ids_that_would_collide_in_channel_names() {
        let json = br#"{
            "eventType": "grant",
            "relyingParty": "dwp",
            "caseId": "a.b",
            "subjectId": "c",
            "issuedAt": "2025-01-01T00:00:00Z"
        }"#;
        assert!(matches!(
            ConsentDecision::from_slice(json),
            Err(RecordError::InvalidField { field, .. }) if field == "caseId"
        ));

        let json = br#"{
            "eventType": "grant",
            "rp": "dwp",
            "caseId": "4711",
            "citizenId": "",
            "at": "2025-01-01T00:00:00Z"
        }"#;
        assert!(matches!(
            ConsentDecision::from_slice(json),
            Err(RecordError::InvalidField { field, .. }) if field == "subjectId"
        ));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert_eq!(
            ConsentDecision::from_slice(b"[1, 2]"),
            Err(RecordError::NotAnObject)
        );
    }

    #[test]
    fn status_strings() {
        assert_eq!(ConsentStatus::NotRequested.as_str(), "not_requested");
        assert_eq!(ConsentStatus::Requested.as_str(), "requested");
        assert_eq!(ConsentStatus::Granted.as_str(), "granted");
        assert_eq!(ConsentStatus::Revoked.as_str(), "revoked");
    }
}
