//! Call Initiator
//!
//! Starts an outbound call for a lead: creates the session, pre-warms the
//! greeting audio and asks the gateway to dial.

use crate::application::agent_voice::AgentVoice;
use crate::application::record_session_events;
use crate::application::session_store::SessionStore;
use crate::domain::call::CallSession;
use crate::domain::dialogue::{greeting_text, CompanyProfile};
use crate::domain::lead::LeadStore;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{CallId, LeadId, PhoneNumber};
use crate::domain::telephony::{CallPlacement, TelephonyGateway};
use futures::FutureExt;
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CallInitiator {
    leads: Arc<dyn LeadStore>,
    gateway: Arc<dyn TelephonyGateway>,
    store: Arc<SessionStore>,
    voice: Arc<AgentVoice>,
    company: CompanyProfile,
    /// Caller ID presented to the lead
    caller_number: String,
    /// Externally reachable base URL of this service
    base_url: String,
}

impl CallInitiator {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        gateway: Arc<dyn TelephonyGateway>,
        store: Arc<SessionStore>,
        voice: Arc<AgentVoice>,
        company: CompanyProfile,
        caller_number: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            leads,
            gateway,
            store,
            voice,
            company,
            caller_number: caller_number.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Place a call to the lead, or to `override_number` when given.
    ///
    /// Returns the session as it stands once the gateway has answered. A
    /// rejected placement leaves the session in `FAILED`.
    pub async fn start_call(&self, lead_id: &LeadId, override_number: Option<&str>) -> Result<CallSession> {
        let lead = self
            .leads
            .find_by_id(lead_id)
            .await
            .map_err(|e| CallError::Internal(e.to_string()))?
            .ok_or_else(|| CallError::LeadNotFound(lead_id.to_string()))?;

        let to = PhoneNumber::parse(override_number.unwrap_or(&lead.phone_number))
            .map_err(CallError::InvalidPhoneNumber)?;
        let from = PhoneNumber::parse(&self.caller_number)
            .map_err(|e| CallError::Validation(format!("caller number: {}", e)))?;

        let id = CallId::new();
        let greeting = greeting_text(&self.company, &lead);
        self.store.create(id, lead)?;

        // The answered webhook picks this up from the cache
        let greeting_audio_url = match self
            .voice
            .cache()
            .get_or_synthesize(id, 0, &greeting, self.voice.voice())
            .await
        {
            Ok(asset) => asset.url,
            Err(e) => {
                warn!(call_id = %id, "Greeting pre-warm failed, will retry on answer: {}", e);
                None
            }
        };

        let placement = CallPlacement {
            to,
            from,
            callback_url: format!("{}/webhooks/voice/{}", self.base_url, id),
            greeting_audio_url,
        };

        // Holding the session lock keeps early webhooks waiting until placement is recorded
        let gateway = Arc::clone(&self.gateway);
        let (placed, events, snapshot) = self
            .store
            .with_lock(&id, move |session| {
                async move {
                    let placed = gateway.place_call(&placement).await;
                    match &placed {
                        Ok(call) => session.mark_ringing(Some(call.provider_ref.clone()))?,
                        Err(_) => session.fail()?,
                    }
                    Ok::<_, CallError>((placed, session.take_events(), session.clone()))
                }
                .boxed()
            })
            .await?;
        record_session_events(&events);

        match placed {
            Ok(call) => {
                counter!("callpilot_calls_initiated_total").increment(1);
                info!(call_id = %id, lead_id = %lead_id, provider_ref = %call.provider_ref, "Call placed");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(call_id = %id, lead_id = %lead_id, "Call placement failed: {}", e);
                Err(CallError::TelephonyFailure(e.to_string()))
            }
        }
    }
}
