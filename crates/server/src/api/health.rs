use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use gatekeeper_engine::{IngestSnapshot, RelayStateView, RelayView};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"ok"` once both inbound streams are connected, `"starting"` before.
    pub status: &'static str,
    pub ready: bool,
    pub ingest: Vec<IngestSnapshot>,
}

/// `GET /healthz` -- 200 when both inbound streams are connected, 503 while
/// the relay is still waiting for its transport.
pub async fn healthz(State(view): State<RelayView>) -> impl IntoResponse {
    let ready = view.is_ready();
    let body = HealthResponse {
        status: if ready { "ok" } else { "starting" },
        ready,
        ingest: vec![view.raw_status().snapshot(), view.consent_status().snapshot()],
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// `GET /state` -- counters, readiness and a configuration summary.
pub async fn state(State(view): State<RelayView>) -> Json<RelayStateView> {
    Json(view.state())
}
