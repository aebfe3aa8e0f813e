//! Voice webhook handler
//!
//! Translates the gateway's form-encoded callbacks into [`EventEnvelope`]s and
//! answers with the XML voice document.

use super::calls_handler::AppState;
use crate::domain::call::VoiceResponseDirective;
use crate::domain::shared::value_objects::CallId;
use crate::domain::telephony::{EventEnvelope, WebhookEvent};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, warn};

/// Header carrying the provider's retry-stable delivery token
pub const IDEMPOTENCY_HEADER: &str = "I-Twilio-Idempotency-Token";

/// Query string of the webhook URL
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    /// Set on URLs we hand to the gateway: `answered` or `speech`
    pub event: Option<String>,
}

/// Form fields posted by the gateway
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhookForm {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub speech_result: Option<String>,
    pub sequence_number: Option<String>,
    pub error_message: Option<String>,
}

/// Map a delivery to a session event. `None` for deliveries that carry
/// nothing the session acts on.
pub fn to_event(query: &WebhookQuery, form: &VoiceWebhookForm) -> Option<WebhookEvent> {
    let speech = || WebhookEvent::SpeechResult {
        text: form.speech_result.clone().unwrap_or_default(),
    };

    match query.event.as_deref() {
        Some("speech") => return Some(speech()),
        Some("answered") => return Some(WebhookEvent::Answered),
        Some("ringing") => return Some(WebhookEvent::Ringing),
        Some("ended") => {
            return Some(WebhookEvent::CallEnded {
                status: form.call_status.clone(),
            })
        }
        Some("error") => {
            return Some(WebhookEvent::Error {
                reason: form.error_message.clone().unwrap_or_else(|| "unspecified".to_string()),
            })
        }
        Some(other) => warn!("Unknown webhook event parameter '{}'", other),
        None => {}
    }

    if form.speech_result.is_some() {
        return Some(speech());
    }

    match form.call_status.as_deref()? {
        "queued" | "initiated" | "ringing" => Some(WebhookEvent::Ringing),
        // Pickup is delivered through the `event=answered` TwiML fetch
        "in-progress" | "answered" => None,
        status @ ("completed" | "busy" | "no-answer" | "canceled" | "failed") => {
            Some(WebhookEvent::CallEnded {
                status: Some(status.to_string()),
            })
        }
        other => {
            warn!("Unknown call status '{}'", other);
            None
        }
    }
}

/// Handle a voice webhook for one call
pub async fn voice_webhook(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    Form(form): Form<VoiceWebhookForm>,
) -> Response {
    let Ok(id) = call_id.parse::<CallId>() else {
        warn!("Webhook for malformed call id {}", call_id);
        return xml(VoiceResponseDirective::hangup_now().to_xml(None));
    };

    let Some(event) = to_event(&query, &form) else {
        debug!(call_id = %id, status = ?form.call_status, "Webhook carries no session event");
        return xml(VoiceResponseDirective::empty().to_xml(None));
    };

    let mut envelope = EventEnvelope::new(id, event);
    if let Some(sequence) = form.sequence_number.as_deref().and_then(|s| s.trim().parse().ok()) {
        envelope = envelope.with_sequence(sequence);
    }
    if let Some(key) = headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok()) {
        envelope = envelope.with_idempotency_key(key);
    }

    let directive = state.dispatcher.handle(envelope).await;
    let action = format!("{}/webhooks/voice/{}?event=speech", state.public_base_url, id);
    xml(directive.to_xml(Some(&action)))
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}
