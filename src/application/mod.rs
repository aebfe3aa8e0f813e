//! Application layer - Use cases and application services
//!
//! This layer orchestrates the call session aggregate and the outbound ports
//! (speech, dialogue, calendar, telephony) to fulfill the call flow.

pub mod agent_voice;
pub mod audio_cache;
pub mod call_initiator;
pub mod dispatcher;
pub mod scheduling;
pub mod session_store;
pub mod turn_engine;

pub use agent_voice::{AgentVoice, RecordedClip, Spoken};
pub use audio_cache::{AudioCacheManager, AudioCacheSettings};
pub use call_initiator::CallInitiator;
pub use dispatcher::WebhookDispatcher;
pub use scheduling::{NegotiationSettings, SchedulingNegotiator};
pub use session_store::SessionStore;
pub use turn_engine::{TurnEngine, TurnSettings};

use crate::domain::call::{SessionEvent, SessionEventKind};
use metrics::{counter, gauge};
use tracing::{debug, info};

/// Log committed session events and keep the session gauges current
pub(crate) fn record_session_events(events: &[SessionEvent]) {
    for event in events {
        match &event.kind {
            SessionEventKind::Created => {
                gauge!("callpilot_active_sessions").increment(1.0);
            }
            SessionEventKind::Ended { state } => {
                gauge!("callpilot_active_sessions").decrement(1.0);
                counter!("callpilot_calls_ended_total", "state" => state.as_str()).increment(1);
                info!(call_id = %event.call_id, state = %state, "Call ended");
            }
            SessionEventKind::NegotiationResolved { status } => {
                info!(call_id = %event.call_id, status = %status, "Negotiation resolved");
            }
            _ => {}
        }
        debug!(call_id = %event.call_id, event = event.kind.name(), at = %event.occurred_at, "Session event");
    }
}
