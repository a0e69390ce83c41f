//! Error types for the voice satellite

use thiserror::Error;

/// Result type alias for satellite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice satellite
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture error (recorder failed or produced the wrong format)
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Query service error
    #[error("query error: {0}")]
    Query(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Wake listener error
    #[error("listener error: {0}")]
    Listener(String),

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
