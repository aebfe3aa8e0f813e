//! Audio Cache Manager
//!
//! Owns every synthesized asset. A key maps to a shared synthesis future, so
//! concurrent requests for the same utterance await one synthesizer call and
//! retried webhooks get the finished asset back without paying twice.

use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use crate::domain::speech::{AssetKey, AudioAsset, SpeechSynthesizer, VoiceParams};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type SharedSynthesis = Shared<BoxFuture<'static, AudioAsset>>;

struct CacheEntry {
    created_at: DateTime<Utc>,
    synthesis: SharedSynthesis,
}

/// Timing knobs for synthesis
#[derive(Debug, Clone, Copy)]
pub struct AudioCacheSettings {
    /// Per-attempt synthesizer timeout
    pub timeout: Duration,
    /// Base delay before the single retry, jittered up to +50%
    pub retry_backoff: Duration,
    /// Age after which a settled asset is swept
    pub retention: ChronoDuration,
}

pub struct AudioCacheManager {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    entries: DashMap<AssetKey, CacheEntry>,
    settings: AudioCacheSettings,
}

impl AudioCacheManager {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: AudioCacheSettings) -> Self {
        Self {
            synthesizer,
            entries: DashMap::new(),
            settings,
        }
    }

    /// Return the asset for this utterance, synthesizing it at most once.
    ///
    /// Fails with `SynthesisFailure` once the retry is exhausted. The failed
    /// entry stays visible until the next request for the key replaces it.
    pub async fn get_or_synthesize(
        &self,
        session_id: CallId,
        turn_index: usize,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<AudioAsset> {
        let key = AssetKey::new(session_id, turn_index, text, voice);

        // The map guard must be released before awaiting
        let synthesis = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get().synthesis.peek().map(AudioAsset::is_ready) {
                Some(true) => {
                    counter!("callpilot_synthesis_cache_hits_total").increment(1);
                    debug!(call_id = %session_id, turn_index, "Audio cache hit");
                    occupied.get().synthesis.clone()
                }
                Some(false) => {
                    debug!(call_id = %session_id, turn_index, "Retrying previously failed synthesis");
                    let fresh = self.start(key.clone(), text, voice);
                    occupied.insert(CacheEntry::new(fresh.clone()));
                    fresh
                }
                None => {
                    debug!(call_id = %session_id, turn_index, "Joining in-flight synthesis");
                    occupied.get().synthesis.clone()
                }
            },
            Entry::Vacant(vacant) => {
                let fresh = self.start(key.clone(), text, voice);
                vacant.insert(CacheEntry::new(fresh.clone()));
                fresh
            }
        };

        let asset = synthesis.await;
        if asset.is_ready() {
            Ok(asset)
        } else {
            Err(CallError::SynthesisFailure(format!(
                "no audio for turn {} of {}",
                turn_index, session_id
            )))
        }
    }

    /// Current state of an asset, if the cache knows the key
    pub fn peek(&self, key: &AssetKey) -> Option<AudioAsset> {
        let entry = self.entries.get(key)?;
        Some(
            entry
                .synthesis
                .peek()
                .cloned()
                .unwrap_or_else(|| AudioAsset::pending(key.clone(), entry.created_at)),
        )
    }

    /// Remove settled assets older than the retention window or whose
    /// session is no longer live, and discard their audio. In-flight
    /// syntheses are never removed.
    pub async fn sweep<F>(&self, now: DateTime<Utc>, session_is_live: F) -> usize
    where
        F: Fn(&CallId) -> bool,
    {
        let retention = self.settings.retention;
        let mut removed = 0;
        let mut published = Vec::new();

        self.entries.retain(|key, entry| {
            let Some(asset) = entry.synthesis.peek() else {
                return true;
            };
            let expired = asset.generated_at + retention < now;
            if !expired && session_is_live(&key.session_id) {
                return true;
            }
            removed += 1;
            if asset.is_ready() {
                published.push(key.clone());
            }
            false
        });

        // Map guards are released, safe to await
        for key in &published {
            if let Err(e) = self.synthesizer.discard(key).await {
                warn!(call_id = %key.session_id, turn_index = key.turn_index, "Could not discard swept audio: {}", e);
            }
        }

        if removed > 0 {
            debug!(removed, discarded = published.len(), "Swept audio assets");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn start(&self, key: AssetKey, text: &str, voice: &VoiceParams) -> SharedSynthesis {
        let synthesizer = Arc::clone(&self.synthesizer);
        let text = text.to_string();
        let voice = voice.clone();
        let settings = self.settings;

        async move { synthesize_with_retry(synthesizer, key, text, voice, settings).await }
            .boxed()
            .shared()
    }
}

impl CacheEntry {
    fn new(synthesis: SharedSynthesis) -> Self {
        Self {
            created_at: Utc::now(),
            synthesis,
        }
    }
}

async fn synthesize_with_retry(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    key: AssetKey,
    text: String,
    voice: VoiceParams,
    settings: AudioCacheSettings,
) -> AudioAsset {
    const ATTEMPTS: u32 = 2;

    for attempt in 1..=ATTEMPTS {
        if attempt > 1 {
            let base = settings.retry_backoff.as_millis() as u64;
            let jitter = rand::thread_rng().gen_range(0..=base / 2);
            tokio::time::sleep(Duration::from_millis(base + jitter)).await;
        }

        counter!("callpilot_synthesis_requests_total").increment(1);
        match tokio::time::timeout(settings.timeout, synthesizer.synthesize(&key, &text, &voice)).await {
            Ok(Ok(audio)) => return AudioAsset::ready(key, audio.url),
            Ok(Err(e)) => {
                warn!(call_id = %key.session_id, turn_index = key.turn_index, attempt, "Speech synthesis failed: {}", e);
            }
            Err(_) => {
                warn!(call_id = %key.session_id, turn_index = key.turn_index, attempt, "Speech synthesis timed out");
            }
        }
    }

    counter!("callpilot_synthesis_failures_total").increment(1);
    AudioAsset::failed(key)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::speech::{AssetStatus, SpeechError, SynthesizedAudio};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Synthesizer that counts calls, optionally slow or failing
    pub(crate) struct CountingSynthesizer {
        pub calls: AtomicUsize,
        pub delay: Duration,
        /// Number of initial calls that fail
        pub failures: AtomicUsize,
        pub discarded: Mutex<Vec<AssetKey>>,
    }

    impl CountingSynthesizer {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                failures: AtomicUsize::new(0),
                discarded: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        pub(crate) fn failing(failures: usize) -> Self {
            let synthesizer = Self::new();
            synthesizer.failures.store(failures, Ordering::SeqCst);
            synthesizer
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynthesizer {
        async fn synthesize(
            &self,
            key: &AssetKey,
            _text: &str,
            _voice: &VoiceParams,
        ) -> std::result::Result<SynthesizedAudio, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SpeechError::Unavailable("down".to_string()));
            }
            Ok(SynthesizedAudio {
                url: format!("https://calls.example.com/audio/{}.mp3", key.file_stem()),
            })
        }

        async fn discard(&self, key: &AssetKey) -> std::result::Result<(), SpeechError> {
            self.discarded.lock().unwrap().push(key.clone());
            Ok(())
        }
    }

    pub(crate) fn settings() -> AudioCacheSettings {
        AudioCacheSettings {
            timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(1),
            retention: ChronoDuration::minutes(10),
        }
    }

    #[tokio::test]
    async fn test_second_request_is_a_cache_hit() {
        let synthesizer = Arc::new(CountingSynthesizer::new());
        let cache = AudioCacheManager::new(synthesizer.clone(), settings());
        let id = CallId::new();
        let voice = VoiceParams::default();

        let first = cache.get_or_synthesize(id, 0, "Hello Jane", &voice).await.unwrap();
        let second = cache.get_or_synthesize(id, 0, "Hello Jane", &voice).await.unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(synthesizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_synthesis() {
        let synthesizer = Arc::new(CountingSynthesizer::slow(Duration::from_millis(50)));
        let cache = Arc::new(AudioCacheManager::new(synthesizer.clone(), settings()));
        let id = CallId::new();
        let voice = VoiceParams::default();

        let (a, b) = tokio::join!(
            cache.get_or_synthesize(id, 1, "Tell me more", &voice),
            cache.get_or_synthesize(id, 1, "Tell me more", &voice),
        );

        assert_eq!(a.unwrap().url, b.unwrap().url);
        assert_eq!(synthesizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_retry_recovers() {
        let synthesizer = Arc::new(CountingSynthesizer::failing(1));
        let cache = AudioCacheManager::new(synthesizer.clone(), settings());

        let asset = cache
            .get_or_synthesize(CallId::new(), 0, "hi", &VoiceParams::default())
            .await
            .unwrap();

        assert_eq!(asset.status, AssetStatus::Ready);
        assert_eq!(synthesizer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_after_retry_is_reported_then_retried_later() {
        let synthesizer = Arc::new(CountingSynthesizer::failing(2));
        let cache = AudioCacheManager::new(synthesizer.clone(), settings());
        let id = CallId::new();
        let voice = VoiceParams::default();

        let result = cache.get_or_synthesize(id, 0, "hi", &voice).await;
        assert!(matches!(result, Err(CallError::SynthesisFailure(_))));
        assert_eq!(synthesizer.calls(), 2);

        let key = AssetKey::new(id, 0, "hi", &voice);
        assert_eq!(cache.peek(&key).map(|a| a.status), Some(AssetStatus::Failed));

        let asset = cache.get_or_synthesize(id, 0, "hi", &voice).await.unwrap();
        assert!(asset.is_ready());
        assert_eq!(synthesizer.calls(), 3);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_and_pending_assets() {
        let synthesizer = Arc::new(CountingSynthesizer::new());
        let cache = AudioCacheManager::new(synthesizer.clone(), settings());
        let live = CallId::new();
        let ended = CallId::new();
        let voice = VoiceParams::default();

        cache.get_or_synthesize(live, 0, "a", &voice).await.unwrap();
        cache.get_or_synthesize(ended, 0, "b", &voice).await.unwrap();

        let removed = cache.sweep(Utc::now(), |id| *id == live).await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            synthesizer.discarded.lock().unwrap().as_slice(),
            &[AssetKey::new(ended, 0, "b", &voice)]
        );

        let removed = cache.sweep(Utc::now() + ChronoDuration::hours(1), |_| true).await;
        assert_eq!(removed, 1);
        assert!(cache.is_empty());
        assert_eq!(synthesizer.discarded.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_does_not_discard_failed_assets() {
        let synthesizer = Arc::new(CountingSynthesizer::failing(2));
        let cache = AudioCacheManager::new(synthesizer.clone(), settings());

        let result = cache.get_or_synthesize(CallId::new(), 0, "hi", &VoiceParams::default()).await;
        assert!(result.is_err());

        assert_eq!(cache.sweep(Utc::now(), |_| false).await, 1);
        assert!(synthesizer.discarded.lock().unwrap().is_empty());
    }
}
