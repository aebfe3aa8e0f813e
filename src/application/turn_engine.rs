//! Turn Engine
//!
//! One conversational cycle while the session is `IN_PROGRESS`: record the
//! caller, ask the dialogue policy, merge its signals, speak the reply and
//! decide what the gateway does next.

use crate::application::agent_voice::AgentVoice;
use crate::application::scheduling::SchedulingNegotiator;
use crate::config::ConversationConfig;
use crate::domain::call::{CallSession, ListenSpec, VoiceResponseDirective};
use crate::domain::dialogue::{DialoguePolicy, DialogueReply, DialogueRequest};
use crate::domain::shared::result::Result;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for the generic dialogue
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub policy_timeout: Duration,
    /// Spoken when the policy fails or its output is unusable
    pub fallback_utterance: String,
    /// Caller turns before the agent wraps up
    pub max_turns: usize,
    pub max_no_input_attempts: u32,
    pub reprompt_text: String,
    pub no_input_goodbye_text: String,
    pub closing_text: String,
    pub listen: ListenSpec,
}

impl TurnSettings {
    pub fn from_config(conversation: &ConversationConfig, policy_timeout: Duration, fallback_utterance: &str) -> Self {
        Self {
            policy_timeout,
            fallback_utterance: fallback_utterance.to_string(),
            max_turns: conversation.max_turns,
            max_no_input_attempts: conversation.max_no_input_attempts,
            reprompt_text: conversation.reprompt_text.clone(),
            no_input_goodbye_text: conversation.no_input_goodbye_text.clone(),
            closing_text: conversation.closing_text.clone(),
            listen: ListenSpec {
                timeout_seconds: conversation.gather_timeout_secs,
                max_attempts: conversation.max_no_input_attempts,
                stop_phrases: conversation.speech_hints.clone(),
            },
        }
    }
}

pub struct TurnEngine {
    policy: Arc<dyn DialoguePolicy>,
    voice: Arc<AgentVoice>,
    negotiator: Arc<SchedulingNegotiator>,
    settings: TurnSettings,
}

impl TurnEngine {
    pub fn new(
        policy: Arc<dyn DialoguePolicy>,
        voice: Arc<AgentVoice>,
        negotiator: Arc<SchedulingNegotiator>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            policy,
            voice,
            negotiator,
            settings,
        }
    }

    /// Run one turn for non-empty caller speech
    pub async fn process_turn(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        session.reset_no_input();
        session.push_caller_turn(text)?;
        counter!("callpilot_turns_processed_total").increment(1);

        if session.caller_turns() >= self.settings.max_turns {
            info!(call_id = %session.id(), turns = session.caller_turns(), "Turn limit reached, closing call");
            return self.close(session, &self.settings.closing_text).await;
        }

        let (utterance, ready_to_schedule, end_call) = match self.ask_policy(session).await {
            Some(reply) => {
                session.merge_signals(&reply.signals);
                (reply.utterance, reply.ready_to_schedule, reply.end_call)
            }
            None => (self.settings.fallback_utterance.clone(), false, false),
        };

        let spoken = if end_call {
            self.voice.say_closing(session, &utterance).await?
        } else {
            self.voice.say(session, &utterance).await?
        };

        if end_call {
            info!(call_id = %session.id(), "Dialogue policy ended the call");
            session.complete()?;
            return Ok(VoiceResponseDirective::play_then_hangup(spoken.url));
        }

        if ready_to_schedule && session.schedule().is_none() {
            info!(call_id = %session.id(), "Lead is ready to schedule");
            session.begin_scheduling()?;
            let proposal = self.negotiator.open(session).await?;
            return Ok(VoiceResponseDirective::empty().play(spoken.url).then(proposal));
        }

        Ok(VoiceResponseDirective::play_then_listen(spoken.url, self.settings.listen.clone()))
    }

    /// Empty speech result: re-prompt, or close once the allowance is spent
    pub async fn handle_no_input(&self, session: &mut CallSession) -> Result<VoiceResponseDirective> {
        let attempts = session.record_no_input();
        debug!(call_id = %session.id(), attempts, "No caller input");

        if attempts > self.settings.max_no_input_attempts {
            info!(call_id = %session.id(), "No input after re-prompts, closing call");
            return self.close(session, &self.settings.no_input_goodbye_text).await;
        }

        let spoken = self.voice.say(session, &self.settings.reprompt_text).await?;
        Ok(VoiceResponseDirective::play_then_listen(spoken.url, self.settings.listen.clone()))
    }

    async fn ask_policy(&self, session: &CallSession) -> Option<DialogueReply> {
        let request = DialogueRequest {
            lead: session.lead().clone(),
            history: session.turns().to_vec(),
            signals: session.signals().clone(),
            state: session.state(),
        };

        match tokio::time::timeout(self.settings.policy_timeout, self.policy.next_reply(&request)).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(e)) => {
                warn!(call_id = %session.id(), "Dialogue policy failed, using fallback utterance: {}", e);
                counter!("callpilot_dialogue_fallbacks_total").increment(1);
                None
            }
            Err(_) => {
                warn!(call_id = %session.id(), "Dialogue policy timed out, using fallback utterance");
                counter!("callpilot_dialogue_fallbacks_total").increment(1);
                None
            }
        }
    }

    async fn close(&self, session: &mut CallSession, text: &str) -> Result<VoiceResponseDirective> {
        let spoken = self.voice.say_closing(session, text).await?;
        session.complete()?;
        Ok(VoiceResponseDirective::play_then_hangup(spoken.url))
    }

    pub fn listen_spec(&self) -> &ListenSpec {
        &self.settings.listen
    }
}
