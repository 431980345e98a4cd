//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use super::{AudioPlayback, PLAYBACK_SAMPLE_RATE, PlaybackOutcome, Synthesizer};
use crate::{Error, Result};

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    /// `OpenAI` speech API
    OpenAI,
    /// ElevenLabs text-to-speech API
    ElevenLabs,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// ElevenLabs ignores `speed`; `voice` is its voice id.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        provider: TtsProvider,
        api_key: Option<SecretString>,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config(format!("{provider:?} API key required for TTS")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = elevenlabs_url(&self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// ElevenLabs endpoint for `voice`, asking for MP3 at the playback rate
fn elevenlabs_url(voice: &str) -> String {
    format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{voice}?output_format=mp3_{PLAYBACK_SAMPLE_RATE}_48"
    )
}

/// Speaks text through a TTS backend and the default output device
pub struct TtsSynthesizer {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl TtsSynthesizer {
    /// Pair a TTS backend with an output device
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait]
impl Synthesizer for TtsSynthesizer {
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(text, "speaking");

        let audio = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("cancelled before synthesis finished");
                return Ok(());
            }
            audio = self.tts.synthesize(text) => audio?,
        };

        let outcome = self.playback.play_mp3(&audio, cancel.clone()).await?;
        if outcome == PlaybackOutcome::Cancelled {
            tracing::info!("speech interrupted");
        }
        Ok(())
    }
}
