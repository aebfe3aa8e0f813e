//! Configuration management
//!
//! Built-in defaults, then an optional TOML file (`callpilot.toml`, or the
//! path in `CALLPILOT_CONFIG`), then `CALLPILOT__SECTION__KEY` environment
//! overrides.

use crate::domain::dialogue::CompanyProfile;
use crate::domain::schedule::{BusinessCalendar, TimeWindow};
use crate::domain::speech::VoiceParams;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub speech: SpeechConfig,
    pub dialogue: DialogueConfig,
    pub company: CompanyProfile,
    pub conversation: ConversationConfig,
    pub scheduling: SchedulingConfig,
    pub sessions: SessionsConfig,
    pub leads: LeadsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used for callback and audio URLs
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Caller ID for outbound calls, E.164
    pub caller_number: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub api_base: String,
    pub api_key: String,
    pub voice: VoiceParams,
    /// Directory synthesized audio is written to and served from
    pub audio_dir: String,
    pub timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub asset_retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Pre-recorded audio played when synthesis fails mid-conversation
    pub fallback_audio_url: String,
    pub fallback_text: String,
    /// Pre-recorded opening line, played when the greeting cannot be synthesized
    pub greeting_fallback_audio_url: String,
    pub greeting_fallback_text: String,
    /// Pre-recorded goodbye, played when a closing line cannot be synthesized
    pub closing_fallback_audio_url: String,
    pub closing_fallback_text: String,
    /// Pre-recorded audio played before hanging up on an internal error
    pub apology_audio_url: String,
    pub apology_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_ms: u64,
    /// Spoken when the policy fails or returns something unusable
    pub fallback_utterance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Caller turns before the agent wraps up
    pub max_turns: usize,
    pub gather_timeout_secs: u32,
    /// Consecutive empty speech results tolerated
    pub max_no_input_attempts: u32,
    pub speech_hints: Vec<String>,
    pub reprompt_text: String,
    pub no_input_goodbye_text: String,
    pub closing_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Offset of the sales team's wall clock from UTC
    pub utc_offset_minutes: i32,
    /// "HH:MM"
    pub business_hours_start: String,
    pub business_hours_end: String,
    /// Monday = 0
    pub business_days: Vec<u32>,
    pub meeting_duration_minutes: i64,
    pub slots_to_propose: usize,
    pub days_to_search: u32,
    pub max_reprompts: u32,
    pub organizer_email: Option<String>,
    pub calendar_timeout_ms: u64,
    /// Known busy windows on the organizer's calendar
    pub busy: Vec<BusyWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// How long a terminated session stays addressable
    pub retention_secs: u64,
    /// Sessions still open after this long are failed and swept
    pub max_session_age_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadsConfig {
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            caller_number: "+15005550006".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io/v1".to_string(),
            api_key: String::new(),
            voice: VoiceParams::default(),
            audio_dir: "audio".to_string(),
            timeout_ms: 4_000,
            retry_backoff_ms: 250,
            asset_retention_secs: 3_600,
            sweep_interval_secs: 300,
            fallback_audio_url: "http://localhost:8080/audio/static/fallback.mp3".to_string(),
            fallback_text: "Sorry, I missed that. Could you say it once more?".to_string(),
            greeting_fallback_audio_url: "http://localhost:8080/audio/static/greeting.mp3".to_string(),
            greeting_fallback_text: "Hi, this is Alex calling from SalesBot AI Solutions. Do you have a minute to chat?".to_string(),
            closing_fallback_audio_url: "http://localhost:8080/audio/static/goodbye.mp3".to_string(),
            closing_fallback_text: "Thank you for your time today. Goodbye.".to_string(),
            apology_audio_url: "http://localhost:8080/audio/static/apology.mp3".to_string(),
            apology_text: "I'm sorry, I'm having some trouble on my end. A member of our team will follow up with you. Goodbye.".to_string(),
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 256,
            timeout_ms: 6_000,
            fallback_utterance: "Could you repeat that?".to_string(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 12,
            gather_timeout_secs: 5,
            max_no_input_attempts: 2,
            speech_hints: Vec::new(),
            reprompt_text: "Sorry, I didn't quite catch that. Could you say that again?".to_string(),
            no_input_goodbye_text: "I'm not hearing anything, so I'll let you go. Goodbye.".to_string(),
            closing_text: "Thank you for your time today. We've covered quite a bit. A team member will follow up if necessary. Goodbye.".to_string(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            business_hours_start: "09:00".to_string(),
            business_hours_end: "17:00".to_string(),
            business_days: vec![0, 1, 2, 3, 4],
            meeting_duration_minutes: 30,
            slots_to_propose: 3,
            days_to_search: 7,
            max_reprompts: 2,
            organizer_email: None,
            calendar_timeout_ms: 5_000,
            busy: Vec::new(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3_600,
            max_session_age_secs: 7_200,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            path: "config/leads.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CALLPILOT_CONFIG").unwrap_or_else(|_| "callpilot.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("CALLPILOT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("conversation.speech_hints")
                    .with_list_parse_key("scheduling.business_days")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduling.business_calendar()?;
        if self.scheduling.slots_to_propose == 0 {
            return Err(ConfigError::Message(
                "scheduling.slots_to_propose must be at least 1".to_string(),
            ));
        }
        if self.sessions.max_session_age_secs == 0 {
            return Err(ConfigError::Message(
                "sessions.max_session_age_secs must be at least 1".to_string(),
            ));
        }
        if self.conversation.max_turns == 0 {
            return Err(ConfigError::Message(
                "conversation.max_turns must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn asset_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.asset_retention_secs as i64)
    }
}

impl DialogueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SchedulingConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Message(format!(
                "scheduling.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Working-time rules for slot search
    pub fn business_calendar(&self) -> Result<BusinessCalendar, ConfigError> {
        let parse = |field: &str, value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| {
                ConfigError::Message(format!("scheduling.{} '{}': {}", field, value, e))
            })
        };

        let day_start = parse("business_hours_start", &self.business_hours_start)?;
        let day_end = parse("business_hours_end", &self.business_hours_end)?;
        if day_end <= day_start {
            return Err(ConfigError::Message(
                "scheduling business hours end before they start".to_string(),
            ));
        }
        if let Some(day) = self.business_days.iter().find(|d| **d > 6) {
            return Err(ConfigError::Message(format!(
                "scheduling.business_days contains {}, expected 0 (Monday) to 6",
                day
            )));
        }

        Ok(BusinessCalendar {
            offset: self.offset()?,
            day_start,
            day_end,
            business_days: self.business_days.clone(),
            meeting_minutes: self.meeting_duration_minutes,
        })
    }

    pub fn busy_windows(&self) -> Vec<TimeWindow> {
        self.busy
            .iter()
            .map(|b| TimeWindow::new(b.start, b.end))
            .collect()
    }

    pub fn calendar_timeout(&self) -> Duration {
        Duration::from_millis(self.calendar_timeout_ms)
    }
}

impl SessionsConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_session_age_secs as i64)
    }
}
