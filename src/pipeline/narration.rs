//! Narration runner: speak every response of a finished chain, in order.
//!
//! For each response `i`: synthesize with the voice for language `i`, write
//! `response_{i}.mp3` into the output directory, play it to the end, then
//! move on.  The first failure ends the sequence.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::speech::{AudioPlayer, SpeechError, SpeechSynthesizer};

#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("could not prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("speech for response {index} failed: {source}")]
    Synthesis {
        index: usize,
        #[source]
        source: SpeechError,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playback of response {index} failed: {source}")]
    Playback {
        index: usize,
        #[source]
        source: SpeechError,
    },

    #[error("playback task failed: {0}")]
    Join(String),
}

/// What to narrate and where the audio goes.
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub responses: Vec<String>,
    /// Language tag per response, matched by position.
    pub languages: Vec<String>,
    /// Used when `languages` is shorter than `responses`.
    pub default_language: String,
    pub output_dir: PathBuf,
}

impl NarrationRequest {
    pub fn language_for(&self, index: usize) -> &str {
        self.languages
            .get(index)
            .map(String::as_str)
            .unwrap_or(&self.default_language)
    }

    pub fn audio_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("response_{index}.mp3"))
    }
}

/// Narrate every response; returns the number of files played.
pub async fn narrate(
    speech: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    request: NarrationRequest,
) -> Result<usize, NarrationError> {
    if request.responses.is_empty() {
        return Ok(0);
    }

    tokio::fs::create_dir_all(&request.output_dir)
        .await
        .map_err(|source| NarrationError::OutputDir {
            path: request.output_dir.clone(),
            source,
        })?;

    for (index, response) in request.responses.iter().enumerate() {
        let language = request.language_for(index);
        log::debug!("narration: response {index} language={language}");

        let audio = speech
            .synthesize(response, language)
            .await
            .map_err(|source| NarrationError::Synthesis { index, source })?;

        let path = request.audio_path(index);
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|source| NarrationError::Write {
                path: path.clone(),
                source,
            })?;

        let player = Arc::clone(&player);
        tokio::task::spawn_blocking(move || player.play(&path))
            .await
            .map_err(|e| NarrationError::Join(e.to_string()))?
            .map_err(|source| NarrationError::Playback { index, source })?;
    }

    log::info!("narration: played {} responses", request.responses.len());
    Ok(request.responses.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::playback::RecordingPlayer;
    use crate::speech::MockSpeech;

    fn request(dir: &std::path::Path, responses: &[&str], languages: &[&str]) -> NarrationRequest {
        NarrationRequest {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            languages: languages.iter().map(|s| s.to_string()).collect(),
            default_language: "en-US".into(),
            output_dir: dir.join("output"),
        }
    }

    #[tokio::test]
    async fn writes_and_plays_each_response_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let player = Arc::new(RecordingPlayer::default());
        let req = request(dir.path(), &["Hello.", "你好。"], &["en-US", "zh-CN"]);
        let out = req.output_dir.clone();

        let played = narrate(Arc::new(MockSpeech::new()), player.clone(), req)
            .await
            .unwrap();

        assert_eq!(played, 2);
        let first = out.join("response_0.mp3");
        let second = out.join("response_1.mp3");
        assert_eq!(*player.played.lock().unwrap(), vec![first.clone(), second.clone()]);
        assert_eq!(std::fs::read(first).unwrap(), b"en-US:Hello.");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "zh-CN:你好。");
    }

    #[tokio::test]
    async fn missing_language_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), &["a", "b"], &["zh-CN"]);
        assert_eq!(req.language_for(1), "en-US");
        let out = req.output_dir.clone();

        narrate(
            Arc::new(MockSpeech::new()),
            Arc::new(RecordingPlayer::default()),
            req,
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(out.join("response_1.mp3")).unwrap(), b"en-US:b");
    }

    #[tokio::test]
    async fn first_failure_aborts_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let player = Arc::new(RecordingPlayer::default());
        let req = request(dir.path(), &["a", "b", "c"], &[]);
        let out = req.output_dir.clone();

        let err = narrate(Arc::new(MockSpeech::failing_on(1)), player.clone(), req)
            .await
            .unwrap_err();

        assert!(matches!(err, NarrationError::Synthesis { index: 1, .. }));
        assert_eq!(player.played.lock().unwrap().len(), 1);
        assert!(!out.join("response_2.mp3").exists());
    }

    #[tokio::test]
    async fn nothing_to_narrate_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path(), &[], &[]);
        let out = req.output_dir.clone();
        let played = narrate(
            Arc::new(MockSpeech::new()),
            Arc::new(RecordingPlayer::default()),
            req,
        )
        .await
        .unwrap();
        assert_eq!(played, 0);
        assert!(!out.exists());
    }
}
