//! Call API DTOs (Data Transfer Objects)

use crate::domain::call::{CallSession, CallState, ConversationTurn, ExtractedSignals};
use crate::domain::schedule::ScheduleNegotiation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Start call request DTO
#[derive(Debug, Clone, Deserialize)]
pub struct StartCallRequest {
    pub lead_id: String,
    /// Dial this number instead of the lead's own
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Call session response DTO
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub call_id: String,
    pub lead_id: String,
    pub lead_name: String,
    pub state: CallState,
    pub provider_ref: Option<String>,
    pub turns: Vec<ConversationTurn>,
    pub signals: ExtractedSignals,
    pub schedule: Option<ScheduleNegotiation>,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&CallSession> for SessionResponse {
    fn from(session: &CallSession) -> Self {
        Self {
            call_id: session.id().to_string(),
            lead_id: session.lead().id.to_string(),
            lead_name: session.lead().name.clone(),
            state: session.state(),
            provider_ref: session.provider_ref().map(str::to_string),
            turns: session.turns().to_vec(),
            signals: session.signals().clone(),
            schedule: session.schedule().cloned(),
            created_at: *session.created_at(),
            answered_at: session.answered_at().copied(),
            ended_at: session.ended_at().copied(),
        }
    }
}

/// Session list response
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub calls: Vec<SessionResponse>,
    pub total: usize,
}
