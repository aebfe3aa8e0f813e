//! Call session domain events

use crate::domain::call::value_object::{CallState, Speaker};
use crate::domain::schedule::NegotiationStatus;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    Ringing { provider_ref: Option<String> },
    Answered,
    TurnRecorded { speaker: Speaker, index: usize },
    SchedulingStarted,
    NegotiationResolved { status: NegotiationStatus },
    Ended { state: CallState },
}

/// A domain event raised by a [`CallSession`](crate::domain::call::CallSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub call_id: CallId,
    pub kind: SessionEventKind,
}

impl SessionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEventKind::Created => "session.created",
            SessionEventKind::Ringing { .. } => "session.ringing",
            SessionEventKind::Answered => "session.answered",
            SessionEventKind::TurnRecorded { .. } => "session.turn_recorded",
            SessionEventKind::SchedulingStarted => "session.scheduling_started",
            SessionEventKind::NegotiationResolved { .. } => "session.negotiation_resolved",
            SessionEventKind::Ended { .. } => "session.ended",
        }
    }
}

impl SessionEvent {
    pub fn new(call_id: CallId, kind: SessionEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            call_id,
            kind,
        }
    }
}
