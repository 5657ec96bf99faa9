//! Text-to-speech synthesis and audio playback.
//!
//! * [`SpeechSynthesizer`]: async trait turning text into encoded audio.
//! * [`ApiSpeech`]: OpenAI-compatible `/audio/speech` client.
//! * [`AudioPlayer`] / [`RodioPlayer`]: blocking playback of a file.
//! * [`resolve_voice`]: language tag → voice name.

pub mod playback;

pub use playback::{AudioPlayer, RodioPlayer};

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{resolve_api_base, AppConfig, LlmProvider};

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech request failed: {0}")]
    Request(String),

    #[error("speech request timed out")]
    Timeout,

    #[error("speech endpoint returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The endpoint answered 200 with no audio.
    #[error("speech endpoint returned no audio")]
    EmptyAudio,

    /// Opening the output device or decoding the file failed.
    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SpeechError::Timeout
        } else {
            SpeechError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async trait for a text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` spoken in `language` and return MP3 bytes.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;
}

// ---------------------------------------------------------------------------
// Voice resolution
// ---------------------------------------------------------------------------

/// Voices the `/audio/speech` endpoint accepts by name.
pub const KNOWN_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];

/// Pick the voice used for `language`.
///
/// Lookup order: the explicit `voices` table, then `default_voice` for the
/// default language, then the tag itself when it already names a voice,
/// then `default_voice`.
pub fn resolve_voice(
    language: &str,
    voices: &BTreeMap<String, String>,
    default_language: &str,
    default_voice: &str,
) -> String {
    if let Some(voice) = voices.get(language) {
        return voice.clone();
    }
    if language == default_language {
        return default_voice.to_string();
    }
    if KNOWN_VOICES
        .iter()
        .any(|v| v.eq_ignore_ascii_case(language))
    {
        return language.to_ascii_lowercase();
    }
    default_voice.to_string()
}

// ---------------------------------------------------------------------------
// ApiSpeech
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `POST /audio/speech` endpoint.
pub struct ApiSpeech {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    voices: BTreeMap<String, String>,
    default_language: String,
    default_voice: String,
}

impl ApiSpeech {
    /// Build from the `[speech]` section, falling back to the `[ai]` section
    /// for the server root and key.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.ai.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let api_base = match config.speech.base_url.as_deref() {
            Some(url) => resolve_api_base(LlmProvider::OpenAiCompatible, Some(url)),
            None => config.ai.api_base(),
        };

        Self {
            client,
            api_base,
            api_key: config
                .speech
                .api_key
                .clone()
                .unwrap_or_else(|| config.ai.api_key.clone()),
            model: config.speech.model.clone(),
            voices: config.speech.voices.clone(),
            default_language: config.general.default_sound_language.clone(),
            default_voice: config.general.default_voice.clone(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn voice_for(&self, language: &str) -> String {
        resolve_voice(
            language,
            &self.voices,
            &self.default_language,
            &self.default_voice,
        )
    }

    fn request_body(&self, text: &str, voice: &str) -> serde_json::Value {
        serde_json::json!({
            "model":           self.model,
            "input":           text,
            "voice":           voice,
            "response_format": "mp3"
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ApiSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/audio/speech", self.api_base);
        let voice = self.voice_for(language);
        log::debug!(
            "speech: POST {url} voice={voice} language={language} text_len={}",
            text.len()
        );

        let mut req = self.client.post(&url).json(&self.request_body(text, &voice));
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Synthesizer that returns `"<language>:<text>"` as the audio bytes, or
/// fails on a chosen call.
#[cfg(test)]
pub struct MockSpeech {
    pub fail_on_call: Option<usize>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSpeech {
    pub fn new() -> Self {
        Self {
            fail_on_call: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(SpeechError::Request("mock failure".into()));
        }
        Ok(format!("{language}:{text}").into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> BTreeMap<String, String> {
        BTreeMap::from([("zh-CN".to_string(), "nova".to_string())])
    }

    #[test]
    fn voice_table_wins() {
        assert_eq!(resolve_voice("zh-CN", &voices(), "en-US", "alloy"), "nova");
    }

    #[test]
    fn default_language_uses_default_voice() {
        assert_eq!(resolve_voice("en-US", &voices(), "en-US", "echo"), "echo");
    }

    #[test]
    fn tag_naming_a_voice_is_used_directly() {
        assert_eq!(resolve_voice("Shimmer", &voices(), "en-US", "alloy"), "shimmer");
    }

    #[test]
    fn unknown_tag_falls_back_to_default_voice() {
        assert_eq!(resolve_voice("fr-FR", &voices(), "en-US", "alloy"), "alloy");
    }

    #[test]
    fn from_config_reuses_completion_endpoint() {
        let mut config = AppConfig::default();
        config.ai.api_key = "sk-ai".into();
        let speech = ApiSpeech::from_config(&config);
        assert_eq!(speech.api_base(), "https://api.openai.com/v1");
        assert_eq!(speech.api_key, "sk-ai");

        config.speech.base_url = Some("http://localhost:8880".into());
        config.speech.api_key = Some(String::new());
        let speech = ApiSpeech::from_config(&config);
        assert_eq!(speech.api_base(), "http://localhost:8880/v1");
        assert!(speech.api_key.is_empty());
    }

    #[test]
    fn request_body_asks_for_mp3() {
        let speech = ApiSpeech::from_config(&AppConfig::default());
        let body = speech.request_body("hello", "alloy");
        assert_eq!(body["model"], "tts-1");
        assert_eq!(body["input"], "hello");
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["response_format"], "mp3");
    }

    #[tokio::test]
    async fn mock_fails_on_requested_call() {
        let mock = MockSpeech::failing_on(1);
        assert_eq!(mock.synthesize("a", "en").await.unwrap(), b"en:a");
        assert!(mock.synthesize("b", "en").await.is_err());
    }
}
