use std::collections::{BTreeMap, BTreeSet};

use axum::Json;
use axum::extract::{Path, Query, State};
use gatekeeper_core::{CaseRef, SubjectId};
use gatekeeper_engine::{ChannelView, RelayView};
use gatekeeper_state::{ActivityEntry, ConsentView, Disposition};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct BuffersResponse {
    /// Maximum records kept per subject.
    pub capacity: usize,
    pub subjects: BTreeMap<SubjectId, usize>,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub subject_id: SubjectId,
    /// Cases currently fanned out to for this subject.
    pub cases: BTreeSet<CaseRef>,
    pub buffered: usize,
    /// Most recent outcomes, oldest first.
    pub entries: Vec<ActivityEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    /// Only return outcomes with this disposition.
    pub disposition: Option<Disposition>,
}

/// `GET /v1/consents`
pub async fn list_consents(State(view): State<RelayView>) -> Json<Vec<ConsentView>> {
    Json(view.consents())
}

/// `GET /v1/buffers`
pub async fn buffer_sizes(State(view): State<RelayView>) -> Json<BuffersResponse> {
    Json(BuffersResponse {
        capacity: view.buffer_capacity(),
        subjects: view.buffer_sizes(),
    })
}

/// `GET /v1/subjects/{subject_id}/activity[?disposition=forwarded]`
///
/// 404 when the relay has never seen the subject in either stream.
pub async fn subject_activity(
    State(view): State<RelayView>,
    Path(subject_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityResponse>, ServerError> {
    let subject_id = SubjectId::new(subject_id);
    let cases = view.cases_for_subject(&subject_id);
    let buffered = view
        .buffer_sizes()
        .get(&subject_id)
        .copied()
        .unwrap_or_default();

    let all = view.activity(&subject_id);
    if cases.is_empty() && all.is_empty() && buffered == 0 {
        return Err(ServerError::NotFound(format!("subject {subject_id}")));
    }
    let entries = match query.disposition {
        Some(disposition) => view.activity_with(&subject_id, disposition),
        None => all,
    };

    Ok(Json(ActivityResponse {
        subject_id,
        cases,
        buffered,
        entries,
    }))
}

/// `GET /v1/channels`
pub async fn list_channels(State(view): State<RelayView>) -> Json<Vec<ChannelView>> {
    Json(view.channels())
}
