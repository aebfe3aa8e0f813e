//! Shared harness for API integration tests
//!
//! Wires the real application services to in-process collaborators so the
//! router can be driven end to end without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use callpilot::application::{
    AgentVoice, AudioCacheManager, AudioCacheSettings, CallInitiator, NegotiationSettings,
    RecordedClip, SchedulingNegotiator, SessionStore, TurnEngine, TurnSettings, WebhookDispatcher,
};
use callpilot::config::{ConversationConfig, SchedulingConfig};
use callpilot::domain::call::SignalUpdate;
use callpilot::domain::dialogue::{
    CompanyProfile, DialogueError, DialoguePolicy, DialogueReply, DialogueRequest,
};
use callpilot::domain::lead::LeadProfile;
use callpilot::domain::shared::value_objects::LeadId;
use callpilot::domain::speech::{
    AssetKey, SpeechError, SpeechSynthesizer, SynthesizedAudio, VoiceParams,
};
use callpilot::domain::telephony::{CallPlacement, PlacedCall, TelephonyError, TelephonyGateway};
use callpilot::infrastructure::calendar::ConfiguredCalendar;
use callpilot::infrastructure::persistence::JsonLeadStore;
use callpilot::interface::api::{build_router, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const BASE_URL: &str = "https://calls.test";
pub const PROVIDER_REF: &str = "CA0123456789";

/// Publishes every utterance under a URL derived from its key
pub struct FakeSynthesizer;

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        key: &AssetKey,
        _text: &str,
        _voice: &VoiceParams,
    ) -> Result<SynthesizedAudio, SpeechError> {
        Ok(SynthesizedAudio {
            url: format!("{}/audio/{}.mp3", BASE_URL, key.file_stem()),
        })
    }
}

/// Hands out canned replies in order
pub struct ScriptedPolicy {
    replies: Mutex<VecDeque<DialogueReply>>,
}

impl ScriptedPolicy {
    pub fn new(replies: Vec<DialogueReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl DialoguePolicy for ScriptedPolicy {
    async fn next_reply(&self, _request: &DialogueRequest) -> Result<DialogueReply, DialogueError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DialogueError::Malformed("script exhausted".to_string()))
    }
}

/// Accepts every placement and remembers it
#[derive(Default)]
pub struct RecordingGateway {
    pub placements: Mutex<Vec<CallPlacement>>,
}

#[async_trait]
impl TelephonyGateway for RecordingGateway {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, TelephonyError> {
        self.placements.lock().unwrap().push(placement.clone());
        Ok(PlacedCall {
            provider_ref: PROVIDER_REF.to_string(),
        })
    }
}

pub fn reply(utterance: &str) -> DialogueReply {
    DialogueReply {
        utterance: utterance.to_string(),
        signals: SignalUpdate::default(),
        ready_to_schedule: false,
        end_call: false,
    }
}

pub fn ready_to_schedule(utterance: &str) -> DialogueReply {
    DialogueReply {
        ready_to_schedule: true,
        ..reply(utterance)
    }
}

pub fn lead() -> LeadProfile {
    LeadProfile {
        id: LeadId::new("lead-1"),
        name: "Dana Whitfield".to_string(),
        phone_number: "+14155550123".to_string(),
        company_name: "Northwind Logistics".to_string(),
        role: "VP Operations".to_string(),
        linkedin_url: String::new(),
        custom_notes: "Reach at dana@northwind.example".to_string(),
        email: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub sessions: Arc<SessionStore>,
    pub gateway: Arc<RecordingGateway>,
    pub calendar: Arc<ConfiguredCalendar>,
    _audio_dir: TempDir,
}

pub fn setup(replies: Vec<DialogueReply>) -> TestApp {
    let audio_dir = TempDir::new().unwrap();
    let company = CompanyProfile::default();

    let cache = Arc::new(AudioCacheManager::new(
        Arc::new(FakeSynthesizer),
        AudioCacheSettings {
            timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(10),
            retention: chrono::Duration::hours(1),
        },
    ));
    let voice = Arc::new(AgentVoice::new(
        cache,
        VoiceParams::default(),
        RecordedClip {
            url: format!("{}/audio/static/fallback.mp3", BASE_URL),
            text: "Sorry, could you say that again?".to_string(),
        },
    ));

    // Open every day so a slot is always available
    let scheduling = SchedulingConfig {
        business_days: (0..7).collect(),
        ..SchedulingConfig::default()
    };
    let calendar = Arc::new(ConfiguredCalendar::new(
        scheduling.business_calendar().unwrap(),
        Vec::new(),
    ));

    let turn_settings = TurnSettings::from_config(
        &ConversationConfig::default(),
        Duration::from_secs(1),
        "Could you repeat that?",
    );
    let negotiator = Arc::new(SchedulingNegotiator::new(
        calendar.clone(),
        Arc::clone(&voice),
        NegotiationSettings::from_config(&scheduling, &company.company_name).unwrap(),
        turn_settings.listen.clone(),
    ));
    let turns = Arc::new(TurnEngine::new(
        Arc::new(ScriptedPolicy::new(replies)),
        Arc::clone(&voice),
        Arc::clone(&negotiator),
        turn_settings,
    ));

    let sessions = Arc::new(SessionStore::new(chrono::Duration::hours(1), chrono::Duration::hours(2)));
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Arc::new(WebhookDispatcher::new(
        Arc::clone(&sessions),
        turns,
        negotiator,
        Arc::clone(&voice),
        company.clone(),
        RecordedClip {
            url: format!("{}/audio/static/apology.mp3", BASE_URL),
            text: "Sorry, goodbye.".to_string(),
        },
    ));
    let initiator = Arc::new(CallInitiator::new(
        Arc::new(JsonLeadStore::from_leads(vec![lead()])),
        gateway.clone(),
        Arc::clone(&sessions),
        voice,
        company,
        "+15005550006".to_string(),
        BASE_URL.to_string(),
    ));

    let state = AppState {
        initiator,
        dispatcher,
        sessions: Arc::clone(&sessions),
        public_base_url: BASE_URL.to_string(),
    };
    let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();

    TestApp {
        router: build_router(state, prometheus_handle, audio_dir.path()),
        sessions,
        gateway,
        calendar,
        _audio_dir: audio_dir,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn form_request(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
