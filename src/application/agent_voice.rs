//! Agent speech shared by the turn engine, the negotiator and the dispatcher

use crate::application::audio_cache::AudioCacheManager;
use crate::domain::call::CallSession;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::speech::VoiceParams;
use metrics::counter;
use std::sync::Arc;
use tracing::warn;

/// What the caller will actually hear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spoken {
    pub text: String,
    pub url: String,
    /// The pre-recorded fallback was used instead of the intended text
    pub fell_back: bool,
}

/// Pre-recorded audio with its transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedClip {
    pub url: String,
    pub text: String,
}

pub struct AgentVoice {
    cache: Arc<AudioCacheManager>,
    voice: VoiceParams,
    /// Played in place of a prompt that expects an answer
    fallback: RecordedClip,
    greeting_fallback: Option<RecordedClip>,
    closing_fallback: Option<RecordedClip>,
}

impl AgentVoice {
    pub fn new(cache: Arc<AudioCacheManager>, voice: VoiceParams, fallback: RecordedClip) -> Self {
        Self {
            cache,
            voice,
            fallback,
            greeting_fallback: None,
            closing_fallback: None,
        }
    }

    /// Clip opening the call when the greeting cannot be synthesized
    pub fn with_greeting_fallback(mut self, clip: RecordedClip) -> Self {
        self.greeting_fallback = Some(clip);
        self
    }

    /// Clip ending the call when the goodbye cannot be synthesized
    pub fn with_closing_fallback(mut self, clip: RecordedClip) -> Self {
        self.closing_fallback = Some(clip);
        self
    }

    /// Synthesize the next agent turn, without fallback
    async fn try_speak(&self, session: &CallSession, text: &str) -> Result<Spoken> {
        let turn_index = session.turns().len();
        let asset = self
            .cache
            .get_or_synthesize(*session.id(), turn_index, text, &self.voice)
            .await?;
        let url = asset.url.ok_or_else(|| {
            CallError::Internal(format!("ready asset without url for turn {}", turn_index))
        })?;

        Ok(Spoken {
            text: text.to_string(),
            url,
            fell_back: false,
        })
    }

    /// Synthesize the next agent turn, falling back to the given clip
    async fn speak_or(&self, session: &CallSession, text: &str, fallback: &RecordedClip) -> Spoken {
        match self.try_speak(session, text).await {
            Ok(spoken) => spoken,
            Err(e) => {
                warn!(call_id = %session.id(), "Using fallback audio: {}", e);
                counter!("callpilot_synthesis_fallbacks_total").increment(1);
                Spoken {
                    text: fallback.text.clone(),
                    url: fallback.url.clone(),
                    fell_back: true,
                }
            }
        }
    }

    /// Speak and record the agent turn in one step
    pub async fn say(&self, session: &mut CallSession, text: &str) -> Result<Spoken> {
        self.say_or(session, text, &self.fallback).await
    }

    /// Like [`say`](Self::say) for the opening line of the call
    pub async fn say_greeting(&self, session: &mut CallSession, text: &str) -> Result<Spoken> {
        let fallback = self.greeting_fallback.as_ref().unwrap_or(&self.fallback);
        self.say_or(session, text, fallback).await
    }

    /// Like [`say`](Self::say) for the last line before hanging up
    pub async fn say_closing(&self, session: &mut CallSession, text: &str) -> Result<Spoken> {
        let fallback = self.closing_fallback.as_ref().unwrap_or(&self.fallback);
        self.say_or(session, text, fallback).await
    }

    async fn say_or(&self, session: &mut CallSession, text: &str, fallback: &RecordedClip) -> Result<Spoken> {
        let spoken = self.speak_or(session, text, fallback).await;
        session.push_agent_turn(spoken.text.clone(), spoken.url.clone())?;
        Ok(spoken)
    }

    pub fn voice(&self) -> &VoiceParams {
        &self.voice
    }

    pub fn cache(&self) -> &Arc<AudioCacheManager> {
        &self.cache
    }
}
