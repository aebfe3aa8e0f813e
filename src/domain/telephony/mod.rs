//! Telephony bounded context - the gateway port and the events it delivers

use crate::domain::shared::value_objects::{CallId, PhoneNumber};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request to place an outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlacement {
    pub to: PhoneNumber,
    pub from: PhoneNumber,
    /// Where the gateway posts events for this call
    pub callback_url: String,
    /// Greeting to play as soon as the callee answers, if already synthesized
    pub greeting_audio_url: Option<String>,
}

/// Gateway acknowledgement of a placed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCall {
    /// Identifier the provider uses for the call
    pub provider_ref: String,
}

/// Telephony errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelephonyError {
    #[error("Call placement rejected: {0}")]
    Rejected(String),

    #[error("Telephony provider unavailable: {0}")]
    Unavailable(String),

    #[error("Telephony request timed out")]
    Timeout,
}

/// Outbound telephony provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelephonyGateway: Send + Sync {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, TelephonyError>;
}

/// Call progress notification delivered by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookEvent {
    Ringing,
    Answered,
    /// Recognized caller speech, possibly empty
    SpeechResult { text: String },
    /// The call is over, `status` is the provider's final status if given
    CallEnded { status: Option<String> },
    Error { reason: String },
}

impl WebhookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WebhookEvent::Ringing => "ringing",
            WebhookEvent::Answered => "answered",
            WebhookEvent::SpeechResult { .. } => "speech_result",
            WebhookEvent::CallEnded { .. } => "call_ended",
            WebhookEvent::Error { .. } => "error",
        }
    }
}

/// A webhook event addressed to a session, with its delivery identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub call_id: CallId,
    /// Provider sequence number, strictly increasing per call
    pub sequence: Option<u64>,
    /// Provider idempotency token, identical across retries
    pub idempotency_key: Option<String>,
    pub event: WebhookEvent,
}

impl EventEnvelope {
    pub fn new(call_id: CallId, event: WebhookEvent) -> Self {
        Self {
            call_id,
            sequence: None,
            idempotency_key: None,
            event,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
