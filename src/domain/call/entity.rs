//! Call entities

use crate::domain::call::value_object::Speaker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One utterance within a call. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    speaker: Speaker,
    text: String,
    at: DateTime<Utc>,
    /// Audio played for agent turns
    audio_url: Option<String>,
}

impl ConversationTurn {
    pub fn caller(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Caller,
            text: text.into(),
            at: Utc::now(),
            audio_url: None,
        }
    }

    pub fn agent(text: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            at: Utc::now(),
            audio_url: Some(audio_url.into()),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn at(&self) -> &DateTime<Utc> {
        &self.at
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }
}
