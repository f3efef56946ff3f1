use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::SubjectId;

/// A record exactly as published by the data holder.
///
/// `fields` holds the complete original object, including fields that must
/// never leave the relay. Use [`RedactionPolicy::minimize`] to obtain the
/// forwardable form.
///
/// [`RedactionPolicy::minimize`]: crate::RedactionPolicy::minimize
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub subject_id: SubjectId,
    pub recorded_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

/// A raw record projected to the allow-list. The only form that is ever
/// buffered or forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalRecord {
    pub subject_id: SubjectId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MinimalRecord {
    /// Look up a field by dotted path, e.g. `prescription.drug`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether a top-level or nested key with this name appears anywhere in
    /// the record.
    #[must_use]
    pub fn contains_key_anywhere(&self, name: &str) -> bool {
        fn walk(value: &Value, name: &str) -> bool {
            match value {
                Value::Object(map) => {
                    map.contains_key(name) || map.values().any(|v| walk(v, name))
                }
                Value::Array(items) => items.iter().any(|v| walk(v, name)),
                _ => false,
            }
        }
        self.fields.contains_key(name) || self.fields.values().any(|v| walk(v, name))
    }

    /// Encode as the JSON payload carried on output channels.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A minimized record held in the per-subject buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedRecord {
    /// Relay-wide arrival sequence number. Strictly increasing in arrival order.
    pub seq: u64,
    /// When the relay received the raw record.
    pub received_at: DateTime<Utc>,
    pub record: MinimalRecord,
}
