//! Projection of raw records onto an explicit field allow-list.
//!
//! Redaction happens once, at ingestion. Anything not named by an allowed
//! path is dropped, and denied keys are stripped at every depth even when an
//! allowed path selects a whole subtree that contains them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::channel::check_segment;
use crate::error::RecordError;
use crate::record::{MinimalRecord, RawRecord};
use crate::types::SubjectId;

const DEFAULT_ALLOW: &[&str] = &[
    "prescription.drug",
    "prescription.dose",
    "prescription.repeats",
    "prescription.prescriber",
];

/// Decodes raw records and projects them to their minimal form.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    /// Candidate subject fields, in priority order. The first is canonical.
    subject_fields: Vec<String>,
    recorded_at_field: String,
    allow: Vec<Vec<String>>,
    deny: BTreeSet<String>,
}

impl RedactionPolicy {
    /// Create a policy that keeps only the given dotted field paths.
    pub fn new(allow: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            subject_fields: vec!["subjectId".to_owned(), "patientId".to_owned()],
            recorded_at_field: "recordedAt".to_owned(),
            allow: allow
                .into_iter()
                .map(|path| split_path(path.as_ref()))
                .filter(|segments| !segments.is_empty())
                .collect(),
            deny: BTreeSet::from(["internalNotes".to_owned()]),
        }
    }

    /// Set the fields searched for the subject identifier, in priority order.
    #[must_use]
    pub fn with_subject_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if !fields.is_empty() {
            self.subject_fields = fields;
        }
        self
    }

    /// Set the field carrying the record timestamp.
    #[must_use]
    pub fn with_recorded_at_field(mut self, field: impl Into<String>) -> Self {
        self.recorded_at_field = field.into();
        self
    }

    /// Replace the set of keys that are stripped at any depth.
    #[must_use]
    pub fn with_denied(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deny = keys.into_iter().map(Into::into).collect();
        self
    }

    /// The allowed paths, rendered back in dotted form.
    pub fn allowed_paths(&self) -> Vec<String> {
        self.allow.iter().map(|segments| segments.join(".")).collect()
    }

    /// Keys stripped at every depth.
    pub fn denied_keys(&self) -> &BTreeSet<String> {
        &self.deny
    }

    /// Decode a raw record from message bytes.
    ///
    /// Fails when the payload is not a JSON object, has no subject
    /// identifier, or has no valid `recordedAt` timestamp.
    pub fn parse(&self, bytes: &[u8]) -> Result<RawRecord, RecordError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(fields) = value else {
            return Err(RecordError::NotAnObject);
        };

        let subject_id = self.extract_subject(&fields)?;
        let recorded_at = self.extract_recorded_at(&fields)?;

        Ok(RawRecord {
            subject_id,
            recorded_at,
            fields,
        })
    }

    /// Project a raw record onto the allow-list.
    pub fn minimize(&self, raw: &RawRecord) -> MinimalRecord {
        let mut out = Map::new();
        for path in &self.allow {
            if self.is_identity_field(&path[0]) {
                continue;
            }
            copy_path(&raw.fields, path, &mut out);
        }

        out.retain(|key, _| !self.deny.contains(key));
        for value in out.values_mut() {
            strip_denied(value, &self.deny);
        }

        MinimalRecord {
            subject_id: raw.subject_id.clone(),
            recorded_at: raw.recorded_at,
            fields: out,
        }
    }

    fn is_identity_field(&self, name: &str) -> bool {
        name == self.recorded_at_field || self.subject_fields.iter().any(|f| f == name)
    }

    fn extract_subject(&self, fields: &Map<String, Value>) -> Result<SubjectId, RecordError> {
        for name in &self.subject_fields {
            match fields.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    check_segment(name, s)?;
                    return Ok(SubjectId::new(s.clone()));
                }
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(RecordError::InvalidField {
                        field: name.clone(),
                        reason: "expected a non-empty string".into(),
                    });
                }
            }
        }
        Err(RecordError::MissingField(self.subject_fields[0].clone()))
    }

    fn extract_recorded_at(&self, fields: &Map<String, Value>) -> Result<DateTime<Utc>, RecordError> {
        let field = &self.recorded_at_field;
        match fields.get(field) {
            None | Some(Value::Null) => Err(RecordError::MissingField(field.clone())),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| RecordError::InvalidField {
                    field: field.clone(),
                    reason: e.to_string(),
                }),
            Some(_) => Err(RecordError::InvalidField {
                field: field.clone(),
                reason: "expected an ISO-8601 string".into(),
            }),
        }
    }
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOW)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}

fn copy_path(src: &Map<String, Value>, path: &[String], dst: &mut Map<String, Value>) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Some(value) = src.get(head) else {
        return;
    };
    if rest.is_empty() {
        dst.insert(head.clone(), value.clone());
        return;
    }
    let Value::Object(child_src) = value else {
        return;
    };

    let mut child_dst = match dst.remove(head) {
        Some(Value::Object(existing)) => existing,
        // A broader path already copied a non-object value here.
        Some(other) => {
            dst.insert(head.clone(), other);
            return;
        }
        None => Map::new(),
    };
    copy_path(child_src, rest, &mut child_dst);
    if !child_dst.is_empty() {
        dst.insert(head.clone(), Value::Object(child_dst));
    }
}

fn strip_denied(value: &mut Value, deny: &BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !deny.contains(key));
            for child in map.values_mut() {
                strip_denied(child, deny);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_denied(item, deny);
            }
        }
        _ => {}
    }
}
