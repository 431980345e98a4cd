//! Voice processing module
//!
//! Handles audio capture, transcription, synthesis, and playback. The session
//! loop only sees the traits below; the HTTP and cpal backends implement them.

mod capture;
mod playback;
mod stt;
mod tts;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use playback::{
    AudioPlayback, DecodedAudio, PLAYBACK_SAMPLE_RATE, PlaybackOutcome, decode_mp3, resample,
};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{TextToSpeech, TtsProvider, TtsSynthesizer};

/// Source of fixed-length PCM chunks
///
/// Not `Send`: cpal streams are pinned to the thread that built them.
#[async_trait(?Send)]
pub trait AudioSource {
    /// Capture mono f32 samples for the full `duration`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Audio`] if the device fails or yields nothing
    async fn capture_chunk(&mut self, duration: Duration) -> Result<Vec<f32>>;

    /// Sample rate of captured chunks
    fn sample_rate(&self) -> u32;
}

/// Speech recognition backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a chunk; an empty string means no speech was detected
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Speech output backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, returning promptly with audio stopped once `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()>;
}
