/// Dialogue policy backed by the Gemini `generateContent` REST API
use crate::config::DialogueConfig;
use crate::domain::dialogue::{
    build_prompt, CompanyProfile, DialogueError, DialoguePolicy, DialogueReply, DialogueRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct GeminiDialoguePolicy {
    client: Client,
    config: DialogueConfig,
    company: CompanyProfile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiDialoguePolicy {
    pub fn new(config: DialogueConfig, company: CompanyProfile) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            config,
            company,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl DialoguePolicy for GeminiDialoguePolicy {
    async fn next_reply(&self, request: &DialogueRequest) -> Result<DialogueReply, DialogueError> {
        let prompt = build_prompt(&self.company, request);
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DialogueError::Timeout
                } else {
                    DialogueError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DialogueError::Unavailable(format!("HTTP {}: {}", status, text)));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DialogueError::Malformed(e.to_string()))?;

        let raw = extract_text(payload)?;
        debug!("Dialogue model replied with {} bytes", raw.len());
        DialogueReply::parse(&raw)
    }
}

fn extract_text(payload: GenerateResponse) -> Result<String, DialogueError> {
    if let Some(reason) = payload.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(DialogueError::Malformed(format!("prompt blocked: {}", reason)));
    }

    let text: String = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(DialogueError::Malformed("empty candidate".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts() {
        let payload: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"utterance\":"},{"text":"\"Hi\"}"}]}}]}"#,
        )
        .unwrap();

        let raw = extract_text(payload).unwrap();
        assert_eq!(raw, r#"{"utterance":"Hi"}"#);
        assert_eq!(DialogueReply::parse(&raw).unwrap().utterance, "Hi");
    }

    #[test]
    fn test_blocked_prompt_is_malformed() {
        let payload: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();

        assert!(matches!(extract_text(payload), Err(DialogueError::Malformed(_))));
        assert!(matches!(
            extract_text(GenerateResponse::default()),
            Err(DialogueError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        let policy = GeminiDialoguePolicy::new(DialogueConfig::default(), CompanyProfile::default()).unwrap();
        assert_eq!(
            policy.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
