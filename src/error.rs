//! Error types for Sovra

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Sovra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Sovra
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture or playback device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Remote chat completion error
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure kinds of a remote completion request
///
/// Transport and HTTP-level failures are kept apart from
/// [`CompletionError::NoAnswer`], where the server responded but said nothing.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No response within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS, or body decoding failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Well-formed response without any assistant text
    #[error("no answer in response")]
    NoAnswer,
}

impl Error {
    /// Whether this error came from an audio device
    #[must_use]
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Audio(_))
    }
}
