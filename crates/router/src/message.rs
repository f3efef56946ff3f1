use gatekeeper_core::{ConsentKey, MinimalRecord};

use crate::error::SinkError;

/// Header carrying the relying party on every delivered message.
pub const HEADER_RELYING_PARTY: &str = "rp";
/// Header carrying the case id on every delivered message.
pub const HEADER_CASE_ID: &str = "case_id";

/// A message ready to be handed to a sink.
///
/// The key is always the subject id, so partitioned transports keep one
/// subject's records in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub key: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Encode `record` for delivery under `key`.
    pub fn for_record(key: &ConsentKey, record: &MinimalRecord) -> Result<Self, SinkError> {
        Ok(Self {
            key: key.subject_id.to_string(),
            headers: vec![
                (HEADER_RELYING_PARTY.to_owned(), key.relying_party.to_string()),
                (HEADER_CASE_ID.to_owned(), key.case_id.to_string()),
            ],
            payload: record.to_bytes()?,
        })
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
