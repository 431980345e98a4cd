//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{Transcriber, samples_to_wav};
use crate::{Error, Result};

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// `OpenAI` Whisper transcription API
    Whisper,
    /// Deepgram pre-recorded API
    Deepgram,
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: Option<String>,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        provider: SttProvider,
        api_key: Option<SecretString>,
        model: String,
        language: Option<String>,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config(format!("{provider:?} API key required for STT")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
            provider,
        })
    }

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe_wav(&self, audio: &[u8]) -> Result<String> {
        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await?,
        };
        Ok(text.trim().to_string())
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let mut url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );
        if let Some(ref lang) = self.language {
            url.push_str("&language=");
            url.push_str(lang);
        }

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        Ok(first_transcript(result))
    }
}

fn first_transcript(response: DeepgramResponse) -> String {
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let wav = samples_to_wav(samples, sample_rate)?;
        let text = self.transcribe_wav(&wav).await?;

        if text.is_empty() {
            tracing::debug!("no speech recognized");
        } else {
            tracing::info!(transcript = %text, "heard");
        }
        Ok(text)
    }
}
