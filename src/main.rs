use anyhow::Context;
use callpilot::application::{
    AgentVoice, AudioCacheManager, AudioCacheSettings, CallInitiator, NegotiationSettings,
    RecordedClip, SchedulingNegotiator, SessionStore, TurnEngine, TurnSettings, WebhookDispatcher,
};
use callpilot::config::Config;
use callpilot::infrastructure::calendar::ConfiguredCalendar;
use callpilot::infrastructure::http::{ElevenLabsSynthesizer, GeminiDialoguePolicy, TwilioGateway};
use callpilot::infrastructure::persistence::JsonLeadStore;
use callpilot::interface::api::{build_router, init_metrics, AppState};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting CallPilot");

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    let base_url = config.server.base_url().to_string();
    info!("Configuration loaded, public base URL {}", base_url);

    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics().context("failed to install metrics recorder")?;

    // Leads
    let leads = Arc::new(
        JsonLeadStore::load(&config.leads.path)
            .await
            .context("failed to load leads")?,
    );

    // External collaborators
    let synthesizer = Arc::new(ElevenLabsSynthesizer::new(&config.speech, &base_url)?);
    synthesizer
        .clear_audio_dir()
        .await
        .with_context(|| format!("failed to clean audio directory {}", config.speech.audio_dir))?;
    let policy = Arc::new(GeminiDialoguePolicy::new(config.dialogue.clone(), config.company.clone())?);
    let gateway = Arc::new(TwilioGateway::new(&config.telephony)?);
    let calendar = Arc::new(ConfiguredCalendar::new(
        config.scheduling.business_calendar()?,
        config.scheduling.busy_windows(),
    ));

    // Orchestration core
    let sessions = Arc::new(SessionStore::new(
        config.sessions.retention(),
        config.sessions.max_age(),
    ));
    let cache = Arc::new(AudioCacheManager::new(
        synthesizer,
        AudioCacheSettings {
            timeout: config.speech.timeout(),
            retry_backoff: config.speech.retry_backoff(),
            retention: config.speech.asset_retention(),
        },
    ));
    let voice = Arc::new(
        AgentVoice::new(
            Arc::clone(&cache),
            config.speech.voice.clone(),
            RecordedClip {
                url: config.speech.fallback_audio_url.clone(),
                text: config.speech.fallback_text.clone(),
            },
        )
        .with_greeting_fallback(RecordedClip {
            url: config.speech.greeting_fallback_audio_url.clone(),
            text: config.speech.greeting_fallback_text.clone(),
        })
        .with_closing_fallback(RecordedClip {
            url: config.speech.closing_fallback_audio_url.clone(),
            text: config.speech.closing_fallback_text.clone(),
        }),
    );

    let turn_settings = TurnSettings::from_config(
        &config.conversation,
        config.dialogue.timeout(),
        &config.dialogue.fallback_utterance,
    );
    let negotiator = Arc::new(SchedulingNegotiator::new(
        calendar,
        Arc::clone(&voice),
        NegotiationSettings::from_config(&config.scheduling, &config.company.company_name)?,
        turn_settings.listen.clone(),
    ));
    let turns = Arc::new(TurnEngine::new(
        policy,
        Arc::clone(&voice),
        Arc::clone(&negotiator),
        turn_settings,
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        Arc::clone(&sessions),
        turns,
        negotiator,
        Arc::clone(&voice),
        config.company.clone(),
        RecordedClip {
            url: config.speech.apology_audio_url.clone(),
            text: config.speech.apology_text.clone(),
        },
    ));
    let initiator = Arc::new(CallInitiator::new(
        leads,
        gateway,
        Arc::clone(&sessions),
        voice,
        config.company.clone(),
        config.telephony.caller_number.clone(),
        base_url.clone(),
    ));

    spawn_sweepers(
        Arc::clone(&sessions),
        cache,
        Duration::from_secs(config.sessions.sweep_interval_secs.max(1)),
        Duration::from_secs(config.speech.sweep_interval_secs.max(1)),
    );

    // Start REST API server
    let state = AppState {
        initiator,
        dispatcher,
        sessions,
        public_base_url: base_url,
    };
    let app = build_router(state, prometheus_handle, &config.speech.audio_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("REST API server listening on {}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}

/// Periodically drop expired sessions and audio assets
fn spawn_sweepers(
    sessions: Arc<SessionStore>,
    cache: Arc<AudioCacheManager>,
    session_period: Duration,
    asset_period: Duration,
) {
    let session_store = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(session_period);
        loop {
            ticker.tick().await;
            let removed = session_store.sweep(Utc::now());
            if removed > 0 {
                info!("Swept {} expired or stale sessions", removed);
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(asset_period);
        loop {
            ticker.tick().await;
            let removed = cache.sweep(Utc::now(), |id| sessions.is_live(id)).await;
            debug!("Audio sweep removed {} assets, {} remain", removed, cache.len());
        }
    });

    info!("Sweeper tasks started");
}
