//! Scheduling Negotiator
//!
//! Runs while the session is in `SCHEDULING`: proposes calendar windows,
//! interprets the caller's answer and books the chosen one.

use crate::application::agent_voice::AgentVoice;
use crate::config::SchedulingConfig;
use crate::domain::call::{CallSession, ListenSpec, VoiceResponseDirective};
use crate::domain::schedule::{
    describe_options, format_for_speech, interpret, AvailabilityQuery, BookingRequest,
    CalendarError, CalendarService, SlotChoice, TimeWindow,
};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use chrono::{FixedOffset, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FULL_CALENDAR_TEXT: &str = "It looks like our calendar is quite full at the moment. I'll make a note for our team to reach out to you by email to find a suitable time. Thanks, and goodbye!";
const CALENDAR_TROUBLE_TEXT: &str = "I had an issue checking the calendar. We'll follow up by email to find a time that works. Thanks, and goodbye!";
const DECLINED_TEXT: &str = "Okay, I understand. I'll make a note for our team to find some alternative times and follow up by email. Thanks for your time, goodbye!";
const GIVE_UP_TEXT: &str = "No problem, we'll follow up by email with a few options instead. Thanks for your time, goodbye!";
const CLARIFY_TEXT: &str = "Sorry, which of those times works best for you? You can say the first one, the second one, and so on.";

/// Tunables for the negotiation
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    pub offset: FixedOffset,
    pub slots_to_propose: usize,
    pub days_to_search: u32,
    /// Re-prompts allowed before the negotiation is abandoned
    pub max_reprompts: u32,
    pub organizer_email: Option<String>,
    pub calendar_timeout: Duration,
    /// Company name used in the meeting summary
    pub company_name: String,
}

impl NegotiationSettings {
    pub fn from_config(
        scheduling: &SchedulingConfig,
        company_name: &str,
    ) -> std::result::Result<Self, config::ConfigError> {
        Ok(Self {
            offset: scheduling.offset()?,
            slots_to_propose: scheduling.slots_to_propose,
            days_to_search: scheduling.days_to_search,
            max_reprompts: scheduling.max_reprompts,
            organizer_email: scheduling.organizer_email.clone(),
            calendar_timeout: scheduling.calendar_timeout(),
            company_name: company_name.to_string(),
        })
    }
}

pub struct SchedulingNegotiator {
    calendar: Arc<dyn CalendarService>,
    voice: Arc<AgentVoice>,
    settings: NegotiationSettings,
    listen: ListenSpec,
}

impl SchedulingNegotiator {
    pub fn new(
        calendar: Arc<dyn CalendarService>,
        voice: Arc<AgentVoice>,
        settings: NegotiationSettings,
        listen: ListenSpec,
    ) -> Self {
        Self {
            calendar,
            voice,
            settings,
            listen,
        }
    }

    /// Propose the first set of windows. The session must already be in `SCHEDULING`.
    pub async fn open(&self, session: &mut CallSession) -> Result<VoiceResponseDirective> {
        match self.query_slots().await {
            Ok(slots) if !slots.is_empty() => {
                let text = format!(
                    "I have a few times available: {}. Which one works best for you?",
                    describe_options(&slots, self.settings.offset)
                );
                info!(call_id = %session.id(), slots = slots.len(), "Proposing meeting slots");
                session.propose_slots(slots)?;
                self.say_and_listen(session, &text).await
            }
            Ok(_) => {
                info!(call_id = %session.id(), "No free meeting slots");
                self.give_up(session, FULL_CALENDAR_TEXT).await
            }
            Err(e) => {
                warn!(call_id = %session.id(), "Availability query failed: {}", e);
                self.give_up(session, CALENDAR_TROUBLE_TEXT).await
            }
        }
    }

    /// Handle the caller's answer to the current proposal
    pub async fn handle_reply(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        session.push_caller_turn(text)?;

        let slots = session
            .schedule()
            .map(|s| s.proposed_slots().to_vec())
            .ok_or_else(|| CallError::Internal("scheduling without a negotiation".to_string()))?;

        match interpret(text, &slots, self.settings.offset) {
            SlotChoice::Selected(index) => self.book(session, slots[index]).await,
            SlotChoice::Rejected => {
                info!(call_id = %session.id(), "Caller declined the proposed slots");
                session.decline_meeting()?;
                self.say_and_close(session, DECLINED_TEXT).await
            }
            SlotChoice::Ambiguous => self.reprompt(session, CLARIFY_TEXT).await,
        }
    }

    async fn book(&self, session: &mut CallSession, window: TimeWindow) -> Result<VoiceResponseDirective> {
        let lead = session.lead();
        let lead_email = lead.contact_email();
        if lead_email.is_none() {
            warn!(call_id = %session.id(), lead_id = %lead.id, "No email for lead, inviting organizer only");
        }

        let request = BookingRequest {
            window,
            summary: format!("Sales Call: {} / {}", self.settings.company_name, lead.name),
            description: format!("Scheduled sales call with {}. Lead ID: {}.", lead.name, lead.id),
            attendees: self
                .settings
                .organizer_email
                .iter()
                .cloned()
                .chain(lead_email.clone())
                .collect(),
        };

        let outcome = tokio::time::timeout(self.settings.calendar_timeout, self.calendar.book(&request))
            .await
            .unwrap_or(Err(CalendarError::Timeout));

        match outcome {
            Ok(confirmation) => {
                session.book_meeting(window, confirmation.confirmation_id.clone())?;
                counter!("callpilot_meetings_booked_total").increment(1);
                info!(call_id = %session.id(), confirmation = %confirmation.confirmation_id, "Meeting booked");

                let when = format_for_speech(window.start, self.settings.offset);
                let text = if lead_email.is_some() {
                    format!("Excellent, you're booked for {}. You'll receive a calendar invitation shortly. Thanks again, goodbye!", when)
                } else {
                    format!("Excellent, I have you down for {}. A team member will confirm your email to send the invitation. Thanks again, goodbye!", when)
                };
                self.say_and_close(session, &text).await
            }
            Err(CalendarError::Conflict) => {
                counter!("callpilot_calendar_conflicts_total").increment(1);
                warn!(call_id = %session.id(), "Chosen slot was taken before booking");
                if self.count_reprompt(session)? {
                    return self.give_up(session, GIVE_UP_TEXT).await;
                }

                match self.query_slots().await {
                    Ok(slots) if !slots.is_empty() => {
                        let text = format!(
                            "It looks like that time was just taken. Here's what I have now: {}. Which one works for you?",
                            describe_options(&slots, self.settings.offset)
                        );
                        session.propose_slots(slots)?;
                        self.say_and_listen(session, &text).await
                    }
                    Ok(_) => self.give_up(session, FULL_CALENDAR_TEXT).await,
                    Err(e) => {
                        warn!(call_id = %session.id(), "Availability re-query failed: {}", e);
                        self.give_up(session, CALENDAR_TROUBLE_TEXT).await
                    }
                }
            }
            Err(e) => {
                warn!(call_id = %session.id(), "Booking failed: {}", e);
                self.give_up(session, CALENDAR_TROUBLE_TEXT).await
            }
        }
    }

    async fn reprompt(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        if self.count_reprompt(session)? {
            return self.give_up(session, GIVE_UP_TEXT).await;
        }
        self.say_and_listen(session, text).await
    }

    /// Count a re-prompt. Returns true once the allowance is exhausted.
    fn count_reprompt(&self, session: &mut CallSession) -> Result<bool> {
        let reprompts = session.record_schedule_reprompt()?;
        Ok(reprompts > self.settings.max_reprompts)
    }

    async fn query_slots(&self) -> std::result::Result<Vec<TimeWindow>, CallError> {
        let query = AvailabilityQuery {
            from: Utc::now(),
            days: self.settings.days_to_search,
            count: self.settings.slots_to_propose,
        };

        let result = tokio::time::timeout(
            self.settings.calendar_timeout,
            self.calendar.list_availability(&query),
        )
        .await
        .unwrap_or(Err(CalendarError::Timeout));

        result
            .map(|mut slots| {
                slots.truncate(self.settings.slots_to_propose);
                slots
            })
            .map_err(|e| CallError::CalendarServiceFailure(e.to_string()))
    }

    /// Abandon the negotiation and close the call politely
    async fn give_up(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        session.abandon_meeting()?;
        counter!("callpilot_negotiations_abandoned_total").increment(1);
        info!(call_id = %session.id(), "Meeting negotiation abandoned");
        self.say_and_close(session, text).await
    }

    async fn say_and_listen(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        let spoken = self.voice.say(session, text).await?;
        Ok(VoiceResponseDirective::play_then_listen(spoken.url, self.listen.clone()))
    }

    async fn say_and_close(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        let spoken = self.voice.say_closing(session, text).await?;
        session.complete()?;
        Ok(VoiceResponseDirective::play_then_hangup(spoken.url))
    }
}
