//! Configuration management for Sovra
//!
//! Precedence is env > TOML file > default, as for every setting below.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::command::{Acknowledgements, Triggers};
use crate::voice::{SAMPLE_RATE, SttProvider, TtsProvider};
use crate::{Error, Result};

use file::SovraConfigFile;

/// Default system prompt for the co-host persona
const DEFAULT_SYSTEM_PROMPT: &str = "You are Sovra, a live AI co-host answering questions from a \
spoken audience. Give short, confident, accurate explanations that can be spoken aloud in under \
ten seconds. Prefer precision over entertainment, say so when something is uncertain, and never \
read out code unless explicitly asked.";

/// Default chat completions endpoint
const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Sovra configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice configuration
    pub voice: VoiceConfig,

    /// Chat completion configuration
    pub completion: CompletionConfig,

    /// Validated trigger phrases
    pub triggers: Triggers,

    /// Spoken acknowledgements
    pub acknowledgements: Acknowledgements,

    /// Session loop timing and startup state
    pub session: SessionConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Spoken language hint passed to STT
    pub language: Option<String>,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Full chat completions URL
    pub url: String,

    /// Bearer token, if the endpoint needs one
    pub api_key: Option<SecretString>,

    /// Model name; omitted from requests when unset
    pub model: Option<String>,

    /// System prompt sent with every question
    pub system_prompt: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Max tokens for responses
    pub max_tokens: u32,

    /// Bound on one request, including connect and body
    pub timeout: Duration,
}

/// Session loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Length of each listening chunk
    pub listen_window: Duration,

    /// Pause after speaking before the next capture
    pub cooldown: Duration,

    /// Pause between ordinary cycles
    pub pacing: Duration,

    /// Pause after a device error
    pub backoff: Duration,

    /// Whether questions are answered at startup
    pub start_enabled: bool,

    /// Ignore everything but the stop phrase while speaking
    pub suppress_while_speaking: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listen_window: Duration::from_secs(6),
            cooldown: Duration::from_secs(4),
            pacing: Duration::from_millis(200),
            backoff: Duration::from_secs(1),
            start_enabled: true,
            suppress_while_speaking: true,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<SecretString>,

    /// Deepgram API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and a TOML file
    ///
    /// With `path` set, the file must exist and parse. Without it, the
    /// standard path is tried and problems there only produce a warning.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is unreadable or any value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };

        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if durations are invalid or trigger phrases overlap
    pub fn from_sources<F>(fc: SovraConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str, fallback: Option<String>| {
            env(key).or(fallback).map(SecretString::from)
        };

        // Keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", fc.api_keys.openai),
            deepgram: secret("DEEPGRAM_API_KEY", fc.api_keys.deepgram),
            elevenlabs: secret("ELEVENLABS_API_KEY", fc.api_keys.elevenlabs),
        };

        // Voice (env > toml > provider default)
        let stt_provider = fc.voice.stt_provider.unwrap_or(SttProvider::Whisper);
        let tts_provider = fc.voice.tts_provider.unwrap_or(TtsProvider::OpenAI);
        let voice = VoiceConfig {
            sample_rate: fc.voice.sample_rate.unwrap_or(SAMPLE_RATE),
            stt_provider,
            stt_model: env("SOVRA_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model(stt_provider).to_string()),
            language: fc.voice.language.or_else(|| Some("en".to_string())),
            tts_provider,
            tts_model: env("SOVRA_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| default_tts_model(tts_provider).to_string()),
            tts_voice: env("SOVRA_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
        };

        if voice.sample_rate == 0 {
            return Err(Error::Config("voice.sample_rate must be positive".to_string()));
        }
        if !(0.25..=4.0).contains(&voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed {} outside 0.25..=4.0",
                voice.tts_speed
            )));
        }

        let completion = CompletionConfig {
            url: env("SOVRA_CHAT_URL")
                .or(fc.completion.url)
                .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            api_key: secret("SOVRA_API_KEY", fc.api_keys.completion),
            model: env("SOVRA_CHAT_MODEL").or(fc.completion.model),
            system_prompt: fc
                .completion
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: fc.completion.temperature.unwrap_or(0.75),
            max_tokens: fc.completion.max_tokens.unwrap_or(384),
            timeout: seconds("completion.timeout_secs", fc.completion.timeout_secs)?
                .unwrap_or(Duration::from_secs(120)),
        };

        let defaults = Triggers::default();
        let t = fc.triggers;
        let triggers = Triggers::new(
            t.stop.as_deref().unwrap_or(defaults.stop()),
            t.turn_on.as_deref().unwrap_or(defaults.turn_on()),
            t.pause.as_deref().unwrap_or(defaults.pause()),
            t.wake_prefix.as_deref().unwrap_or(defaults.wake_prefix()),
        )?;

        let default_acks = Acknowledgements::default();
        let acknowledgements = Acknowledgements {
            turned_on: t.turned_on_reply.unwrap_or(default_acks.turned_on),
            already_on: t.already_on_reply.unwrap_or(default_acks.already_on),
            paused: t.paused_reply.unwrap_or(default_acks.paused),
        };

        let default_session = SessionConfig::default();
        let s = fc.session;
        let session = SessionConfig {
            listen_window: seconds("session.listen_window_secs", s.listen_window_secs)?
                .unwrap_or(default_session.listen_window),
            cooldown: seconds("session.cooldown_secs", s.cooldown_secs)?
                .unwrap_or(default_session.cooldown),
            pacing: seconds("session.pacing_secs", s.pacing_secs)?
                .unwrap_or(default_session.pacing),
            backoff: seconds("session.backoff_secs", s.backoff_secs)?
                .unwrap_or(default_session.backoff),
            start_enabled: s.start_enabled.unwrap_or(default_session.start_enabled),
            suppress_while_speaking: s
                .suppress_while_speaking
                .unwrap_or(default_session.suppress_while_speaking),
        };

        if session.listen_window.is_zero() {
            return Err(Error::Config(
                "session.listen_window_secs must be positive".to_string(),
            ));
        }

        Ok(Self {
            voice,
            completion,
            triggers,
            acknowledgements,
            session,
            api_keys,
        })
    }

    /// API key for the configured STT provider
    #[must_use]
    pub fn stt_key(&self) -> Option<SecretString> {
        match self.voice.stt_provider {
            SttProvider::Whisper => self.api_keys.openai.clone(),
            SttProvider::Deepgram => self.api_keys.deepgram.clone(),
        }
    }

    /// API key for the configured TTS provider
    #[must_use]
    pub fn tts_key(&self) -> Option<SecretString> {
        match self.voice.tts_provider {
            TtsProvider::OpenAI => self.api_keys.openai.clone(),
            TtsProvider::ElevenLabs => self.api_keys.elevenlabs.clone(),
        }
    }
}

const fn default_stt_model(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "whisper-1",
        SttProvider::Deepgram => "nova-2",
    }
}

const fn default_tts_model(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAI => "tts-1",
        TtsProvider::ElevenLabs => "eleven_monolingual_v1",
    }
}

/// Convert an optional seconds value, rejecting negative and non-finite input
fn seconds(name: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("{name} = {secs}: {e}")))
        })
        .transpose()
}
