//! TOML configuration file loading
//!
//! Supports `~/.config/sovra/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::{SttProvider, TtsProvider};
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SovraConfigFile {
    /// Capture, recognition, and synthesis settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Chat completion endpoint
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// Trigger phrases and acknowledgements
    #[serde(default)]
    pub triggers: TriggersFileConfig,

    /// Loop pacing and startup state
    #[serde(default)]
    pub session: SessionFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// STT backend ("whisper" or "deepgram")
    pub stt_provider: Option<SttProvider>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Spoken language hint (e.g. "en")
    pub language: Option<String>,

    /// TTS backend ("openai" or "elevenlabs")
    pub tts_provider: Option<TtsProvider>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Chat completion configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<f64>,
}

/// Trigger phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct TriggersFileConfig {
    pub stop: Option<String>,
    pub turn_on: Option<String>,
    pub pause: Option<String>,
    pub wake_prefix: Option<String>,
    pub turned_on_reply: Option<String>,
    pub already_on_reply: Option<String>,
    pub paused_reply: Option<String>,
}

/// Session loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Length of each listening chunk
    pub listen_window_secs: Option<f64>,

    /// Pause after speaking before the next capture
    pub cooldown_secs: Option<f64>,

    /// Pause between ordinary cycles
    pub pacing_secs: Option<f64>,

    /// Pause after a device error
    pub backoff_secs: Option<f64>,

    /// Whether questions are answered at startup
    pub start_enabled: Option<bool>,

    /// Ignore everything but the stop phrase while speaking
    pub suppress_while_speaking: Option<bool>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub completion: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SovraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SovraConfigFile {
    let Some(path) = config_file_path() else {
        return SovraConfigFile::default();
    };

    if !path.exists() {
        return SovraConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            SovraConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<SovraConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/sovra/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sovra").join("config.toml"))
}
