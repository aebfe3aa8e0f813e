//! Webhook Dispatcher
//!
//! Entry point for every gateway event. Serializes events per session,
//! filters retried deliveries, drives the lifecycle and always answers with a
//! directive the gateway can execute.

use crate::application::agent_voice::{AgentVoice, RecordedClip};
use crate::application::record_session_events;
use crate::application::scheduling::SchedulingNegotiator;
use crate::application::session_store::SessionStore;
use crate::application::turn_engine::TurnEngine;
use crate::domain::call::{CallSession, CallState, SessionEvent, VoiceResponseDirective};
use crate::domain::dialogue::{greeting_text, CompanyProfile};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use crate::domain::telephony::{EventEnvelope, WebhookEvent};
use futures::FutureExt;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct WebhookDispatcher {
    store: Arc<SessionStore>,
    turns: Arc<TurnEngine>,
    negotiator: Arc<SchedulingNegotiator>,
    voice: Arc<AgentVoice>,
    company: CompanyProfile,
    /// Played before hanging up on an internal error
    apology: RecordedClip,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<SessionStore>,
        turns: Arc<TurnEngine>,
        negotiator: Arc<SchedulingNegotiator>,
        voice: Arc<AgentVoice>,
        company: CompanyProfile,
        apology: RecordedClip,
    ) -> Self {
        Self {
            store,
            turns,
            negotiator,
            voice,
            company,
            apology,
        }
    }

    /// Handle one webhook delivery. Never fails: errors become a directive.
    pub async fn handle(self: &Arc<Self>, envelope: EventEnvelope) -> VoiceResponseDirective {
        let call_id = envelope.call_id;
        let event_name = envelope.event.name();
        let call_ended = matches!(envelope.event, WebhookEvent::CallEnded { .. });
        counter!("callpilot_webhook_events_total", "type" => event_name).increment(1);
        debug!(call_id = %call_id, event = event_name, sequence = ?envelope.sequence, "Webhook event");

        // Lets in-flight handlers for this call learn about the hang-up early
        if call_ended {
            self.store.signal_hangup(&call_id);
        }

        let this = Arc::clone(self);
        let result = self
            .store
            .with_lock(&call_id, move |session| {
                async move {
                    let directive = this.apply(session, &envelope).await?;
                    Ok::<_, CallError>((directive, session.take_events()))
                }
                .boxed()
            })
            .await;

        let directive = match result {
            Ok((directive, events)) => {
                record_session_events(&events);
                directive
            }
            Err(e) if e.is_unknown_session() => {
                warn!(call_id = %call_id, event = event_name, "Event for unknown session: {}", e);
                VoiceResponseDirective::hangup_now()
            }
            Err(e) => {
                error!(call_id = %call_id, event = event_name, "Event handling failed: {}", e);
                self.fail_session(&call_id).await;
                self.apology_directive()
            }
        };

        if !call_ended && self.store.hangup_signalled(&call_id) {
            debug!(call_id = %call_id, "Caller already hung up, discarding directive");
            return VoiceResponseDirective::hangup_now();
        }

        directive
    }

    async fn apply(&self, session: &mut CallSession, envelope: &EventEnvelope) -> Result<VoiceResponseDirective> {
        let key = envelope.idempotency_key.as_deref();

        if session.is_duplicate(envelope.sequence, key) {
            counter!("callpilot_duplicate_events_total").increment(1);
            info!(call_id = %session.id(), sequence = ?envelope.sequence, "Duplicate delivery, replaying its directive");
            return Ok(session.replay_directive(envelope.sequence, key).cloned().unwrap_or_else(|| {
                if session.is_terminal() {
                    VoiceResponseDirective::hangup_now()
                } else {
                    VoiceResponseDirective::empty()
                }
            }));
        }

        let directive = self.transition(session, &envelope.event).await?;
        session.acknowledge_event(envelope.sequence, key, &directive);
        Ok(directive)
    }

    async fn transition(&self, session: &mut CallSession, event: &WebhookEvent) -> Result<VoiceResponseDirective> {
        use CallState::*;

        match (session.state(), event) {
            (_, WebhookEvent::Error { reason }) if !session.is_terminal() => {
                warn!(call_id = %session.id(), "Gateway reported an error: {}", reason);
                session.fail()?;
                Ok(VoiceResponseDirective::hangup_now())
            }

            (Initiated, WebhookEvent::Ringing) => {
                session.mark_ringing(None)?;
                Ok(VoiceResponseDirective::empty())
            }
            // Status callbacks can trail the call progress
            (Ringing | InProgress | Scheduling, WebhookEvent::Ringing) => Ok(VoiceResponseDirective::empty()),

            (Ringing, WebhookEvent::Answered) => self.greet(session).await,

            (InProgress | Scheduling, WebhookEvent::SpeechResult { text }) if text.trim().is_empty() => {
                self.turns.handle_no_input(session).await
            }
            (InProgress, WebhookEvent::SpeechResult { text }) => {
                self.turns.process_turn(session, text.trim()).await
            }
            (Scheduling, WebhookEvent::SpeechResult { text }) => {
                session.reset_no_input();
                self.negotiator.handle_reply(session, text.trim()).await
            }

            (Initiated | Ringing, WebhookEvent::CallEnded { status }) => {
                if status.as_deref() == Some("failed") {
                    session.fail()?;
                } else {
                    session.mark_no_answer()?;
                }
                Ok(VoiceResponseDirective::empty())
            }
            (InProgress | Scheduling, WebhookEvent::CallEnded { .. }) => {
                session.caller_hung_up()?;
                Ok(VoiceResponseDirective::empty())
            }
            (state, WebhookEvent::CallEnded { .. }) => {
                debug!(call_id = %session.id(), %state, "Call ended after session closed");
                Ok(VoiceResponseDirective::empty())
            }

            (state, event) => {
                counter!("callpilot_invalid_transitions_total").increment(1);
                warn!(call_id = %session.id(), %state, event = event.name(), "Event not valid in current state, ignoring");
                if state.is_terminal() {
                    Ok(VoiceResponseDirective::hangup_now())
                } else {
                    Ok(VoiceResponseDirective::empty())
                }
            }
        }
    }

    /// Answer the call with the pre-warmed greeting, or the recorded one
    async fn greet(&self, session: &mut CallSession) -> Result<VoiceResponseDirective> {
        session.answer()?;

        let greeting = greeting_text(&self.company, session.lead());
        let spoken = self.voice.say_greeting(session, &greeting).await?;

        Ok(VoiceResponseDirective::play_then_listen(
            spoken.url,
            self.turns.listen_spec().clone(),
        ))
    }

    async fn fail_session(&self, call_id: &CallId) {
        let result = self
            .store
            .with_lock(call_id, |session| {
                async move {
                    if !session.is_terminal() {
                        session.fail()?;
                    }
                    Ok::<Vec<SessionEvent>, CallError>(session.take_events())
                }
                .boxed()
            })
            .await;

        match result {
            Ok(events) => record_session_events(&events),
            Err(e) => warn!(call_id = %call_id, "Could not mark session failed: {}", e),
        }
    }

    fn apology_directive(&self) -> VoiceResponseDirective {
        if self.apology.url.is_empty() {
            VoiceResponseDirective::hangup_now()
        } else {
            VoiceResponseDirective::play_then_hangup(self.apology.url.clone())
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audio_cache::tests::{settings, CountingSynthesizer};
    use crate::application::audio_cache::AudioCacheManager;
    use crate::application::scheduling::NegotiationSettings;
    use crate::application::turn_engine::tests::{fallback_clip, reply, ScriptedPolicy};
    use crate::application::turn_engine::TurnSettings;
    use crate::domain::call::{Instruction, ListenSpec, Speaker};
    use crate::domain::dialogue::DialogueReply;
    use crate::domain::lead::sample_lead;
    use crate::domain::schedule::{BookingConfirmation, MockCalendarService, NegotiationStatus, TimeWindow};
    use crate::domain::speech::VoiceParams;
    use chrono::{Duration as ChronoDuration, FixedOffset, TimeZone, Utc};
    use std::time::Duration;

    const APOLOGY_URL: &str = "https://calls.example.com/audio/static/apology.mp3";
    const GREETING_URL: &str = "https://calls.example.com/audio/static/greeting.mp3";

    fn dispatcher(
        synthesizer: CountingSynthesizer,
        policy: ScriptedPolicy,
        calendar: MockCalendarService,
    ) -> Arc<WebhookDispatcher> {
        let store = Arc::new(SessionStore::new(ChronoDuration::minutes(30), ChronoDuration::hours(2)));
        let voice = Arc::new(AgentVoice::new(
            Arc::new(AudioCacheManager::new(Arc::new(synthesizer), settings())),
            VoiceParams::default(),
            fallback_clip(),
        )
        .with_greeting_fallback(RecordedClip {
            url: GREETING_URL.to_string(),
            text: "Hi, this is Alex from SalesBot AI Solutions. Do you have a minute?".to_string(),
        }));
        let negotiator = Arc::new(SchedulingNegotiator::new(
            Arc::new(calendar),
            Arc::clone(&voice),
            NegotiationSettings {
                offset: FixedOffset::east_opt(0).unwrap(),
                slots_to_propose: 3,
                days_to_search: 7,
                max_reprompts: 2,
                organizer_email: Some("sales@callpilot.example".to_string()),
                calendar_timeout: Duration::from_secs(1),
                company_name: "SalesBot AI Solutions".to_string(),
            },
            ListenSpec::default(),
        ));
        let turns = Arc::new(TurnEngine::new(
            Arc::new(policy),
            Arc::clone(&voice),
            Arc::clone(&negotiator),
            TurnSettings {
                policy_timeout: Duration::from_secs(1),
                fallback_utterance: "Could you repeat that?".to_string(),
                max_turns: 12,
                max_no_input_attempts: 2,
                reprompt_text: "Sorry, I didn't quite catch that.".to_string(),
                no_input_goodbye_text: "Goodbye.".to_string(),
                closing_text: "Thanks, goodbye.".to_string(),
                listen: ListenSpec::default(),
            },
        ));

        Arc::new(WebhookDispatcher::new(
            store,
            turns,
            negotiator,
            voice,
            CompanyProfile::default(),
            RecordedClip {
                url: APOLOGY_URL.to_string(),
                text: "Sorry, we're having technical difficulties. Goodbye.".to_string(),
            },
        ))
    }

    fn quiet() -> Arc<WebhookDispatcher> {
        dispatcher(CountingSynthesizer::new(), ScriptedPolicy::new(vec![]), MockCalendarService::new())
    }

    fn envelope(id: CallId, sequence: u64, event: WebhookEvent) -> EventEnvelope {
        EventEnvelope::new(id, event).with_sequence(sequence)
    }

    fn speech(text: &str) -> WebhookEvent {
        WebhookEvent::SpeechResult { text: text.to_string() }
    }

    /// Create a session and walk it to `IN_PROGRESS`
    async fn answered_call(dispatcher: &Arc<WebhookDispatcher>) -> CallId {
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();
        dispatcher.handle(envelope(id, 1, WebhookEvent::Ringing)).await;
        let directive = dispatcher.handle(envelope(id, 2, WebhookEvent::Answered)).await;
        assert!(directive.listens());
        id
    }

    #[tokio::test]
    async fn test_answer_plays_greeting_and_listens() {
        let dispatcher = quiet();
        let id = answered_call(&dispatcher).await;

        let session = dispatcher.store().get(&id).await.unwrap();
        assert_eq!(session.state(), CallState::InProgress);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].speaker(), Speaker::Agent);
        assert!(session.turns()[0].text().starts_with("Hello Jane."));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_changes_nothing() {
        let policy = ScriptedPolicy::new(vec![Ok(reply("Happy to explain."))]);
        let dispatcher = dispatcher(CountingSynthesizer::new(), policy, MockCalendarService::new());
        let id = answered_call(&dispatcher).await;

        let first = dispatcher.handle(envelope(id, 3, speech("Tell me more"))).await;
        let before = dispatcher.store().get(&id).await.unwrap();
        let replay = dispatcher.handle(envelope(id, 3, speech("Tell me more"))).await;
        let after = dispatcher.store().get(&id).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(before.turns(), after.turns());
        assert_eq!(after.last_event_sequence(), Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_ignored() {
        let dispatcher = quiet();
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();

        let ringing = EventEnvelope::new(id, WebhookEvent::Ringing).with_idempotency_key("tok-1");
        dispatcher.handle(ringing.clone()).await;
        dispatcher.handle(ringing).await;

        let session = dispatcher.store().get(&id).await.unwrap();
        assert_eq!(session.state(), CallState::Ringing);
    }

    #[tokio::test]
    async fn test_unknown_call_gets_hangup() {
        let dispatcher = quiet();

        let directive = dispatcher.handle(envelope(CallId::new(), 1, speech("hello?"))).await;

        assert_eq!(directive, VoiceResponseDirective::hangup_now());
    }

    #[tokio::test]
    async fn test_scheduling_flow_books_first_slot() {
        let policy = ScriptedPolicy::new(vec![Ok(DialogueReply {
            ready_to_schedule: true,
            ..reply("Great, let's find a time.")
        })]);
        let mut calendar = MockCalendarService::new();
        calendar.expect_list_availability().times(1).returning(|_| {
            Ok(vec![
                TimeWindow::new(
                    Utc.with_ymd_and_hms(2030, 5, 21, 14, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2030, 5, 21, 14, 30, 0).unwrap(),
                ),
                TimeWindow::new(
                    Utc.with_ymd_and_hms(2030, 5, 22, 10, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2030, 5, 22, 10, 30, 0).unwrap(),
                ),
            ])
        });
        calendar.expect_book().times(1).returning(|_| {
            Ok(BookingConfirmation {
                confirmation_id: "evt_123".to_string(),
            })
        });
        let dispatcher = dispatcher(CountingSynthesizer::new(), policy, calendar);
        let id = answered_call(&dispatcher).await;

        let proposal = dispatcher.handle(envelope(id, 3, speech("Sure, let's book something"))).await;
        assert!(proposal.listens());
        assert_eq!(dispatcher.store().get(&id).await.unwrap().state(), CallState::Scheduling);

        let confirmation = dispatcher.handle(envelope(id, 4, speech("The first one"))).await;
        assert!(confirmation.ends_call());

        let session = dispatcher.store().get(&id).await.unwrap();
        let schedule = session.schedule().unwrap();
        assert_eq!(session.state(), CallState::Completed);
        assert_eq!(schedule.status(), NegotiationStatus::Booked);
        assert_eq!(schedule.confirmation_id(), Some("evt_123"));
    }

    #[tokio::test]
    async fn test_hangup_mid_conversation() {
        let dispatcher = quiet();
        let id = answered_call(&dispatcher).await;

        let ended = WebhookEvent::CallEnded { status: Some("completed".to_string()) };
        dispatcher.handle(envelope(id, 3, ended)).await;
        let late = dispatcher.handle(envelope(id, 4, speech("hello?"))).await;

        let session = dispatcher.store().get(&id).await.unwrap();
        assert_eq!(session.state(), CallState::CallerHungUp);
        assert_eq!(late, VoiceResponseDirective::hangup_now());
    }

    #[tokio::test]
    async fn test_unanswered_call() {
        let dispatcher = quiet();
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();

        dispatcher.handle(envelope(id, 1, WebhookEvent::Ringing)).await;
        let ended = WebhookEvent::CallEnded { status: Some("no-answer".to_string()) };
        dispatcher.handle(envelope(id, 2, ended)).await;

        let session = dispatcher.store().get(&id).await.unwrap();
        assert_eq!(session.state(), CallState::NoAnswer);
    }

    #[tokio::test]
    async fn test_event_out_of_order_is_ignored() {
        let dispatcher = quiet();
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();

        let directive = dispatcher.handle(envelope(id, 1, speech("hello"))).await;

        assert!(directive.is_empty());
        assert_eq!(dispatcher.store().get(&id).await.unwrap().state(), CallState::Initiated);
    }

    #[tokio::test]
    async fn test_greeting_failure_plays_recorded_greeting() {
        let dispatcher = dispatcher(
            CountingSynthesizer::failing(2),
            ScriptedPolicy::new(vec![]),
            MockCalendarService::new(),
        );
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();
        dispatcher.handle(envelope(id, 1, WebhookEvent::Ringing)).await;

        let directive = dispatcher.handle(envelope(id, 2, WebhookEvent::Answered)).await;

        assert_eq!(
            directive.instructions(),
            &[
                Instruction::Play { url: GREETING_URL.to_string() },
                Instruction::Gather(ListenSpec::default()),
            ]
        );
        let session = dispatcher.store().get(&id).await.unwrap();
        assert_eq!(session.state(), CallState::InProgress);
        assert_eq!(session.turns()[0].audio_url(), Some(GREETING_URL));
    }

    #[tokio::test]
    async fn test_gateway_error_fails_session() {
        let dispatcher = quiet();
        let id = answered_call(&dispatcher).await;

        let error = WebhookEvent::Error { reason: "media stream dropped".to_string() };
        let directive = dispatcher.handle(envelope(id, 3, error)).await;

        assert_eq!(directive, VoiceResponseDirective::hangup_now());
        assert_eq!(dispatcher.store().get(&id).await.unwrap().state(), CallState::Failed);
    }

    #[tokio::test]
    async fn test_retry_replays_the_directive_of_that_delivery() {
        let dispatcher = quiet();
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();
        dispatcher.handle(envelope(id, 0, WebhookEvent::Ringing)).await;

        let answer = EventEnvelope::new(id, WebhookEvent::Answered).with_idempotency_key("tok-answer");
        let first = dispatcher.handle(answer.clone()).await;
        let status = EventEnvelope::new(id, WebhookEvent::Ringing)
            .with_sequence(1)
            .with_idempotency_key("tok-ring");
        let trailing = dispatcher.handle(status).await;
        let retry = dispatcher.handle(answer).await;

        assert!(trailing.is_empty());
        assert!(first.listens());
        assert_eq!(retry, first);
        assert_eq!(dispatcher.store().get(&id).await.unwrap().turns().len(), 1);
    }

    #[tokio::test]
    async fn test_hangup_during_slow_greeting_discards_directive() {
        let dispatcher = dispatcher(
            CountingSynthesizer::slow(Duration::from_millis(300)),
            ScriptedPolicy::new(vec![]),
            MockCalendarService::new(),
        );
        let id = CallId::new();
        dispatcher.store().create(id, sample_lead()).unwrap();
        dispatcher.handle(envelope(id, 1, WebhookEvent::Ringing)).await;

        let answering = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle(envelope(id, 2, WebhookEvent::Answered)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ended = WebhookEvent::CallEnded { status: Some("completed".to_string()) };
        dispatcher.handle(envelope(id, 3, ended)).await;

        let directive = answering.await.unwrap();
        assert_eq!(directive, VoiceResponseDirective::hangup_now());
        assert_eq!(dispatcher.store().get(&id).await.unwrap().state(), CallState::CallerHungUp);
    }

    #[tokio::test]
    async fn test_concurrent_events_are_serialized() {
        let replies = (0..4).map(|i| Ok(reply(&format!("answer {}", i)))).collect();
        let dispatcher = dispatcher(CountingSynthesizer::new(), ScriptedPolicy::new(replies), MockCalendarService::new());
        let id = answered_call(&dispatcher).await;

        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let event = EventEnvelope::new(id, speech(&format!("question {}", i)))
                        .with_idempotency_key(format!("tok-{}", i));
                    dispatcher.handle(event).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let session = dispatcher.store().get(&id).await.unwrap();
        // Greeting plus four caller/agent pairs
        assert_eq!(session.turns().len(), 9);
        for pair in session.turns()[1..].chunks(2) {
            assert_eq!(pair[0].speaker(), Speaker::Caller);
            assert_eq!(pair[1].speaker(), Speaker::Agent);
        }
    }
}
