//! Dialogue bounded context - the language-model policy that decides what the agent says next

pub mod prompt;

pub use prompt::{build_prompt, greeting_text, CompanyProfile};

use crate::domain::call::{CallState, ConversationTurn, ExtractedSignals, SignalUpdate};
use crate::domain::lead::LeadProfile;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Everything the policy sees for one turn
#[derive(Debug, Clone)]
pub struct DialogueRequest {
    pub lead: LeadProfile,
    pub history: Vec<ConversationTurn>,
    pub signals: ExtractedSignals,
    pub state: CallState,
}

/// The policy's decision for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueReply {
    pub utterance: String,
    pub signals: SignalUpdate,
    pub ready_to_schedule: bool,
    pub end_call: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    utterance: Option<String>,
    #[serde(default)]
    signals: Option<SignalUpdate>,
    #[serde(default)]
    ready_to_schedule: Option<bool>,
    #[serde(default)]
    end_call: Option<bool>,
}

impl DialogueReply {
    /// Parse the JSON object the model was asked for.
    ///
    /// A surrounding Markdown code fence is tolerated. A missing or blank
    /// utterance is malformed, missing flags default to false.
    pub fn parse(raw: &str) -> Result<Self, DialogueError> {
        let body = strip_code_fence(raw.trim());

        let parsed: RawReply = serde_json::from_str(body)
            .map_err(|e| DialogueError::Malformed(e.to_string()))?;

        let utterance = parsed
            .utterance
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DialogueError::Malformed("missing utterance".to_string()))?;

        Ok(Self {
            utterance,
            signals: parsed.signals.unwrap_or_default(),
            ready_to_schedule: parsed.ready_to_schedule.unwrap_or(false),
            end_call: parsed.end_call.unwrap_or(false),
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Dialogue policy errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogueError {
    #[error("Dialogue policy timed out")]
    Timeout,

    #[error("Dialogue policy unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed dialogue reply: {0}")]
    Malformed(String),
}

/// Language-model backed conversation policy
#[async_trait]
pub trait DialoguePolicy: Send + Sync {
    async fn next_reply(&self, request: &DialogueRequest) -> Result<DialogueReply, DialogueError>;
}
