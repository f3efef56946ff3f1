//! Read-only HTTP query surface over the relay.
//!
//! Nothing here can change consent state or trigger a publish; handlers only
//! read through a [`RelayView`].

pub mod health;
pub mod relay;

use axum::Router;
use axum::routing::get;
use gatekeeper_engine::RelayView;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with every query route.
pub fn router(view: RelayView) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/state", get(health::state))
        .route("/v1/consents", get(relay::list_consents))
        .route("/v1/buffers", get(relay::buffer_sizes))
        .route(
            "/v1/subjects/{subject_id}/activity",
            get(relay::subject_activity),
        )
        .route("/v1/channels", get(relay::list_channels))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(view)
}
