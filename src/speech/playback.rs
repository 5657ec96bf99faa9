//! Blocking audio playback.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::{Decoder, OutputStream, Sink};

use super::SpeechError;

/// Plays an audio file to completion.
///
/// `play` blocks the calling thread until the file has finished; async
/// callers run it on `tokio::task::spawn_blocking`.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, path: &Path) -> Result<(), SpeechError>;
}

/// Plays through the default output device with rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioPlayer;

impl AudioPlayer for RodioPlayer {
    fn play(&self, path: &Path) -> Result<(), SpeechError> {
        // The stream must outlive the sink or playback stops immediately.
        let (_stream, handle) =
            OutputStream::try_default().map_err(|e| SpeechError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| SpeechError::Playback(e.to_string()))?;

        let file = File::open(path)?;
        let source =
            Decoder::new(BufReader::new(file)).map_err(|e| SpeechError::Playback(e.to_string()))?;

        log::debug!("playback: {}", path.display());
        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Records every path it is asked to play instead of producing sound.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: std::sync::Mutex<Vec<std::path::PathBuf>>,
}

#[cfg(test)]
impl AudioPlayer for RecordingPlayer {
    fn play(&self, path: &Path) -> Result<(), SpeechError> {
        if !path.is_file() {
            return Err(SpeechError::Playback(format!("missing {}", path.display())));
        }
        self.played.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}
