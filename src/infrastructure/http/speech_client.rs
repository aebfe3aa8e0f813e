/// Text-to-speech via the ElevenLabs REST API
///
/// Audio is written under the served audio directory and published at
/// `{public_base_url}/audio/{file}`.
use crate::config::SpeechConfig;
use crate::domain::speech::{AssetKey, SpeechError, SpeechSynthesizer, SynthesizedAudio, VoiceParams};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct ElevenLabsSynthesizer {
    client: Client,
    api_base: String,
    api_key: String,
    audio_dir: PathBuf,
    public_base_url: String,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &SpeechConfig, public_base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            audio_dir: PathBuf::from(&config.audio_dir),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn file_name(key: &AssetKey) -> String {
        format!("{}.mp3", key.file_stem())
    }

    fn public_url(&self, key: &AssetKey) -> String {
        format!("{}/audio/{}", self.public_base_url, Self::file_name(key))
    }

    /// Remove synthesized audio left behind by an earlier run.
    ///
    /// Only top-level `.mp3` files go; pre-recorded clips live in
    /// subdirectories and are kept. Returns how many files were removed.
    pub async fn clear_audio_dir(&self) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.audio_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_audio = path.extension().is_some_and(|ext| ext == "mp3");
            if is_audio && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {} stale audio files from {}", removed, self.audio_dir.display());
        }
        Ok(removed)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        key: &AssetKey,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<SynthesizedAudio, SpeechError> {
        let url = format!("{}/text-to-speech/{}", self.api_base, voice.voice_id);
        let body = SynthesisRequest {
            text,
            model_id: &voice.model_id,
            voice_settings: VoiceSettings {
                stability: voice.stability,
                similarity_boost: voice.similarity_boost,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout
                } else {
                    SpeechError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify(status, detail));
        }

        let audio: Bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| SpeechError::Unavailable(format!("audio dir: {}", e)))?;
        let path = self.audio_dir.join(Self::file_name(key));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| SpeechError::Unavailable(format!("{}: {}", path.display(), e)))?;

        debug!(call_id = %key.session_id, turn_index = key.turn_index, bytes = audio.len(), "Audio written to {}", path.display());
        Ok(SynthesizedAudio {
            url: self.public_url(key),
        })
    }

    async fn discard(&self, key: &AssetKey) -> Result<(), SpeechError> {
        let path = self.audio_dir.join(Self::file_name(key));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(call_id = %key.session_id, turn_index = key.turn_index, "Audio removed from {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpeechError::Unavailable(format!("{}: {}", path.display(), e))),
        }
    }
}

fn classify(status: StatusCode, detail: String) -> SpeechError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        SpeechError::Rejected(format!("HTTP {}: {}", status, detail))
    } else {
        SpeechError::Unavailable(format!("HTTP {}: {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::CallId;
    use tempfile::TempDir;

    fn synthesizer_in(dir: &TempDir) -> ElevenLabsSynthesizer {
        let config = SpeechConfig {
            audio_dir: dir.path().to_string_lossy().into_owned(),
            ..SpeechConfig::default()
        };
        ElevenLabsSynthesizer::new(&config, "https://calls.example.com").unwrap()
    }

    #[test]
    fn test_public_url_matches_served_path() {
        let synthesizer =
            ElevenLabsSynthesizer::new(&SpeechConfig::default(), "https://calls.example.com/").unwrap();
        let key = AssetKey::new(CallId::new(), 2, "Hello", &VoiceParams::default());

        let url = synthesizer.public_url(&key);

        assert_eq!(url, format!("https://calls.example.com/audio/{}.mp3", key.file_stem()));
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, String::new()),
            SpeechError::Unavailable(_)
        ));
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, String::new()),
            SpeechError::Rejected(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, String::new()),
            SpeechError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_discard_removes_audio_file() {
        let dir = TempDir::new().unwrap();
        let synthesizer = synthesizer_in(&dir);
        let key = AssetKey::new(CallId::new(), 0, "Hello", &VoiceParams::default());
        let path = dir.path().join(format!("{}.mp3", key.file_stem()));
        tokio::fs::write(&path, b"ID3").await.unwrap();

        synthesizer.discard(&key).await.unwrap();
        assert!(!path.exists());

        // Already gone is fine
        synthesizer.discard(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_audio_dir_keeps_static_clips() {
        let dir = TempDir::new().unwrap();
        let synthesizer = synthesizer_in(&dir);
        tokio::fs::create_dir_all(dir.path().join("static")).await.unwrap();
        tokio::fs::write(dir.path().join("static/fallback.mp3"), b"ID3").await.unwrap();
        tokio::fs::write(dir.path().join("old_0_abc.mp3"), b"ID3").await.unwrap();
        tokio::fs::write(dir.path().join("README"), b"keep").await.unwrap();

        assert_eq!(synthesizer.clear_audio_dir().await.unwrap(), 1);
        assert!(dir.path().join("static/fallback.mp3").exists());
        assert!(dir.path().join("README").exists());
        assert!(!dir.path().join("old_0_abc.mp3").exists());
    }

    #[tokio::test]
    async fn test_clear_missing_audio_dir() {
        let dir = TempDir::new().unwrap();
        let config = SpeechConfig {
            audio_dir: dir.path().join("absent").to_string_lossy().into_owned(),
            ..SpeechConfig::default()
        };
        let synthesizer = ElevenLabsSynthesizer::new(&config, "https://calls.example.com").unwrap();

        assert_eq!(synthesizer.clear_audio_dir().await.unwrap(), 0);
    }
}
