//! Speech bounded context - synthesized audio assets and the synthesizer port

use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Voice settings passed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Identity of one synthesized utterance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub session_id: CallId,
    pub turn_index: usize,
    /// SHA-256 of the text and voice settings, hex encoded
    pub content_hash: String,
}

impl AssetKey {
    pub fn new(session_id: CallId, turn_index: usize, text: &str, voice: &VoiceParams) -> Self {
        Self {
            session_id,
            turn_index,
            content_hash: content_hash(text, voice),
        }
    }

    /// Stable file name for the asset
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}", self.session_id, self.turn_index, &self.content_hash[..16])
    }
}

/// Content key of text spoken with a given voice
pub fn content_hash(text: &str, voice: &VoiceParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(voice.voice_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(voice.model_id.as_bytes());
    hasher.update(voice.stability.to_le_bytes());
    hasher.update(voice.similarity_boost.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Ready,
    Failed,
}

/// A synthesis result tracked by the audio cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub key: AssetKey,
    pub url: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub status: AssetStatus,
}

impl AudioAsset {
    pub fn ready(key: AssetKey, url: impl Into<String>) -> Self {
        Self {
            key,
            url: Some(url.into()),
            generated_at: Utc::now(),
            status: AssetStatus::Ready,
        }
    }

    pub fn pending(key: AssetKey, since: DateTime<Utc>) -> Self {
        Self {
            key,
            url: None,
            generated_at: since,
            status: AssetStatus::Pending,
        }
    }

    pub fn failed(key: AssetKey) -> Self {
        Self {
            key,
            url: None,
            generated_at: Utc::now(),
            status: AssetStatus::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == AssetStatus::Ready
    }
}

/// Where the synthesizer put the audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub url: String,
}

/// Speech synthesis errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech synthesis timed out")]
    Timeout,

    #[error("Speech service unavailable: {0}")]
    Unavailable(String),

    #[error("Speech service rejected the request: {0}")]
    Rejected(String),
}

/// Text-to-speech provider
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and publish it under a URL derived from `key`
    async fn synthesize(
        &self,
        key: &AssetKey,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<SynthesizedAudio, SpeechError>;

    /// Release whatever backs a swept asset. Missing audio is not an error.
    async fn discard(&self, _key: &AssetKey) -> Result<(), SpeechError> {
        Ok(())
    }
}
