use std::collections::BTreeMap;
use std::time::Duration;

use gatekeeper_core::{CaseRef, RedactionPolicy};
use serde::Deserialize;

/// Relay behavior.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// Relying party assumed for seeded cases.
    #[serde(default = "default_relying_party")]
    pub relying_party: String,
    /// Scope a grant must contain for records to be delivered.
    #[serde(default = "default_required_scope")]
    pub required_scope: String,
    /// Records kept per subject for replay.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Outcomes remembered per subject for the activity view.
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
    /// Messages that may wait in the relay inbox before ingesters block.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relying_party: default_relying_party(),
            required_scope: default_required_scope(),
            buffer_capacity: default_buffer_capacity(),
            activity_capacity: default_activity_capacity(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

fn default_relying_party() -> String {
    "dwp".to_owned()
}

fn default_required_scope() -> String {
    gatekeeper_engine::DEFAULT_REQUIRED_SCOPE.to_owned()
}

fn default_buffer_capacity() -> usize {
    gatekeeper_state::DEFAULT_CAPACITY
}

fn default_activity_capacity() -> usize {
    gatekeeper_state::DEFAULT_ACTIVITY_CAPACITY
}

fn default_inbox_capacity() -> usize {
    gatekeeper_engine::DEFAULT_INBOX_CAPACITY
}

/// Which parts of a raw record may leave the relay.
#[derive(Debug, Deserialize)]
pub struct RedactionConfig {
    /// Field carrying the subject identifier.
    #[serde(default = "default_subject_field")]
    pub subject_field: String,
    /// Fallback subject fields, tried in order when `subject_field` is absent.
    #[serde(default = "default_subject_aliases")]
    pub subject_aliases: Vec<String>,
    #[serde(default = "default_recorded_at_field")]
    pub recorded_at_field: String,
    /// Dotted paths copied into the minimal record.
    #[serde(default = "default_allow")]
    pub allow: Vec<String>,
    /// Keys stripped at every depth, even inside allowed subtrees.
    #[serde(default = "default_deny")]
    pub deny: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            subject_field: default_subject_field(),
            subject_aliases: default_subject_aliases(),
            recorded_at_field: default_recorded_at_field(),
            allow: default_allow(),
            deny: default_deny(),
        }
    }
}

impl RedactionConfig {
    pub fn to_policy(&self) -> RedactionPolicy {
        let subject_fields = std::iter::once(self.subject_field.clone())
            .chain(self.subject_aliases.iter().cloned());
        RedactionPolicy::new(&self.allow)
            .with_subject_fields(subject_fields)
            .with_recorded_at_field(self.recorded_at_field.clone())
            .with_denied(self.deny.iter().cloned())
    }
}

fn default_subject_field() -> String {
    "subjectId".to_owned()
}

fn default_subject_aliases() -> Vec<String> {
    vec!["patientId".to_owned()]
}

fn default_recorded_at_field() -> String {
    "recordedAt".to_owned()
}

fn default_allow() -> Vec<String> {
    RedactionPolicy::default().allowed_paths()
}

fn default_deny() -> Vec<String> {
    vec!["internalNotes".to_owned()]
}

/// Output channel naming and provisioning.
#[derive(Debug, Deserialize)]
pub struct ChannelsConfig {
    /// Channel names are `<prefix>.<rp>.<caseId>.<subjectId>`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Retention applied when a channel is provisioned.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl ChannelsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }
}

fn default_prefix() -> String {
    gatekeeper_engine::DEFAULT_CHANNEL_PREFIX.to_owned()
}

fn default_retention_hours() -> u64 {
    168
}

/// Static subject to case index, unioned with the cases seen in consent
/// decisions.
///
/// ```toml
/// [seed.cases]
/// "nhs-999" = ["4711", "4712"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub cases: BTreeMap<String, Vec<String>>,
}

impl SeedConfig {
    /// Every seeded `(subject, case)` pair under `relying_party`.
    pub fn case_refs(&self, relying_party: &str) -> Vec<(String, CaseRef)> {
        self.cases
            .iter()
            .flat_map(|(subject, cases)| {
                cases.iter().map(move |case_id| {
                    (
                        subject.clone(),
                        CaseRef::new(relying_party, case_id.as_str()),
                    )
                })
            })
            .collect()
    }
}
