//! Call Management API handlers

use super::call_dto::{ApiResponse, SessionListResponse, SessionResponse, StartCallRequest};
use crate::application::{CallInitiator, SessionStore, WebhookDispatcher};
use crate::domain::shared::error::CallError;
use crate::domain::shared::value_objects::{CallId, LeadId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub initiator: Arc<CallInitiator>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub sessions: Arc<SessionStore>,
    /// Externally reachable base URL, without a trailing slash
    pub public_base_url: String,
}

/// HTTP status for a call-level error
pub(crate) fn status_for(error: &CallError) -> StatusCode {
    match error {
        CallError::LeadNotFound(_) | CallError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        CallError::SessionExpired(_) => StatusCode::GONE,
        CallError::InvalidPhoneNumber(_) | CallError::Validation(_) => StatusCode::BAD_REQUEST,
        CallError::TelephonyFailure(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start an outbound call
pub async fn start_call(
    State(state): State<AppState>,
    Json(req): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), StatusCode> {
    info!("API: Starting call for lead {}", req.lead_id);

    let lead_id = LeadId::new(req.lead_id);
    match state
        .initiator
        .start_call(&lead_id, req.phone_number.as_deref())
        .await
    {
        Ok(session) => {
            info!("API: Call {} placed for lead {}", session.id(), lead_id);
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::success(SessionResponse::from(&session))),
            ))
        }
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("API: Failed to start call for lead {}: {}", lead_id, e);
            } else {
                warn!("API: Rejected call for lead {}: {}", lead_id, e);
            }
            Ok((status, Json(ApiResponse::error(e.to_string()))))
        }
    }
}

/// Get a call session snapshot
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), StatusCode> {
    info!("API: Getting call {}", call_id);

    let Ok(id) = call_id.parse::<CallId>() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid call id: {}", call_id))),
        ));
    };

    match state.sessions.get(&id).await {
        Ok(session) => Ok((
            StatusCode::OK,
            Json(ApiResponse::success(SessionResponse::from(&session))),
        )),
        Err(e) => Ok((status_for(&e), Json(ApiResponse::error(e.to_string())))),
    }
}

/// List all tracked call sessions
pub async fn list_calls(State(state): State<AppState>) -> Json<ApiResponse<SessionListResponse>> {
    info!("API: Listing calls");

    let mut calls = Vec::new();
    for id in state.sessions.ids() {
        // Sessions swept between listing and lookup are skipped
        if let Ok(session) = state.sessions.get(&id).await {
            calls.push(SessionResponse::from(&session));
        }
    }
    calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = calls.len();
    Json(ApiResponse::success(SessionListResponse { calls, total }))
}

/// Health check
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}
