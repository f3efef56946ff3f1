use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consent::ConsentKey;
use crate::error::RecordError;
use crate::types::{CaseId, RelyingParty};

/// A relying party's case, without the subject it concerns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseRef {
    pub relying_party: RelyingParty,
    pub case_id: CaseId,
}

impl CaseRef {
    /// Create a new case reference.
    #[must_use]
    pub fn new(relying_party: impl Into<RelyingParty>, case_id: impl Into<CaseId>) -> Self {
        Self {
            relying_party: relying_party.into(),
            case_id: case_id.into(),
        }
    }
}

impl fmt::Display for CaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.relying_party, self.case_id)
    }
}

/// Check that `value` can be one segment of a [`ChannelName`].
///
/// Segments are joined with `.`, so a segment must be non-empty and use only
/// `[A-Za-z0-9_-]`. Distinct keys then always map to distinct names, and
/// every name is a legal Kafka topic.
pub fn check_segment(field: &str, value: &str) -> Result<(), RecordError> {
    let invalid = |reason: &str| RecordError::InvalidField {
        field: field.to_owned(),
        reason: reason.to_owned(),
    };
    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(invalid("only letters, digits, '_' and '-' are allowed"));
    }
    Ok(())
}

/// Deterministic name of the per-case output channel for a consent key.
///
/// Rendered as `<prefix>.<relying_party>.<case_id>.<subject_id>`. Keys are
/// expected to pass [`check_segment`], which decoding enforces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Derive the channel name for `key` under `prefix`.
    #[must_use]
    pub fn for_key(prefix: &str, key: &ConsentKey) -> Self {
        let prefix = prefix.trim_end_matches('.');
        if prefix.is_empty() {
            return Self(format!(
                "{}.{}.{}",
                key.relying_party, key.case_id, key.subject_id
            ));
        }
        Self(format!(
            "{prefix}.{}.{}.{}",
            key.relying_party, key.case_id, key.subject_id
        ))
    }

    /// Return the channel name as a str slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_deterministic() {
        let key = ConsentKey::new("dwp", "4711", "nhs-999");
        let a = ChannelName::for_key("views.permitted", &key);
        let b = ChannelName::for_key("views.permitted", &key);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "views.permitted.dwp.4711.nhs-999");
    }

    #[test]
    fn trailing_dot_in_prefix_is_ignored() {
        let key = ConsentKey::new("dwp", "4711", "nhs-999");
        let name = ChannelName::for_key("views.permitted.", &key);
        assert_eq!(name.as_str(), "views.permitted.dwp.4711.nhs-999");
    }

    #[test]
    fn empty_prefix() {
        let key = ConsentKey::new("dwp", "4711", "nhs-999");
        assert_eq!(ChannelName::for_key("", &key).as_str(), "dwp.4711.nhs-999");
    }

    #[test]
    fn segments_with_separators_are_rejected() {
        assert!(check_segment("caseId", "4711").is_ok());
        assert!(check_segment("subjectId", "nhs_999-A").is_ok());
        for bad in ["", "a.b", "a b", "a/b", "café"] {
            assert!(
                matches!(
                    check_segment("caseId", bad),
                    Err(RecordError::InvalidField { ref field, .. }) if field == "caseId"
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn case_ref_display() {
        assert_eq!(CaseRef::new("dwp", "4711").to_string(), "dwp/4711");
    }
}
