//! API Router configuration

use super::calls_handler::{get_call, health_check, list_calls, start_call, AppState};
use super::metrics_handler::metrics_handler;
use super::webhook_handler::voice_webhook;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle, audio_dir: impl AsRef<Path>) -> Router {
    // Health check route
    let health_routes = Router::new().route("/health", get(health_check));

    // Call management routes
    let call_routes = Router::new()
        .route("/calls", post(start_call))
        .route("/calls", get(list_calls))
        .route("/calls/:call_id", get(get_call));

    // Gateway callbacks
    let webhook_routes = Router::new().route("/webhooks/voice/:call_id", post(voice_webhook));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    // Combine routes with state
    Router::new()
        .merge(health_routes)
        .merge(call_routes)
        .merge(webhook_routes)
        .with_state(state)
        .merge(metrics_routes)
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
