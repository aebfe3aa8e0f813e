//! Prometheus metrics handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Describe metrics
    describe_counter!(
        "callpilot_calls_initiated_total",
        "Total number of outbound calls placed"
    );
    describe_counter!(
        "callpilot_calls_ended_total",
        "Total number of calls that reached a terminal state, by state"
    );
    describe_gauge!(
        "callpilot_active_sessions",
        "Number of call sessions not yet terminated"
    );
    describe_counter!(
        "callpilot_webhook_events_total",
        "Total number of webhook events received, by type"
    );
    describe_counter!(
        "callpilot_duplicate_events_total",
        "Total number of duplicate webhook deliveries dropped"
    );
    describe_counter!(
        "callpilot_invalid_transitions_total",
        "Total number of events ignored as invalid in the current state"
    );
    describe_counter!(
        "callpilot_turns_processed_total",
        "Total number of caller turns processed"
    );
    describe_counter!(
        "callpilot_dialogue_fallbacks_total",
        "Total number of turns answered with the fallback utterance"
    );
    describe_counter!(
        "callpilot_synthesis_requests_total",
        "Total number of speech synthesis attempts"
    );
    describe_counter!(
        "callpilot_synthesis_failures_total",
        "Total number of utterances that could not be synthesized"
    );
    describe_counter!(
        "callpilot_synthesis_cache_hits_total",
        "Total number of utterances served from the audio cache"
    );
    describe_counter!(
        "callpilot_synthesis_fallbacks_total",
        "Total number of times pre-recorded fallback audio was played"
    );
    describe_counter!(
        "callpilot_meetings_booked_total",
        "Total number of meetings booked"
    );
    describe_counter!(
        "callpilot_calendar_conflicts_total",
        "Total number of bookings rejected because the slot was taken"
    );
    describe_counter!(
        "callpilot_negotiations_abandoned_total",
        "Total number of scheduling negotiations abandoned"
    );

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
