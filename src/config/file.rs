//! TOML configuration file loading
//!
//! Supports `~/.config/voice-satellite/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

use super::OverlapPolicy;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SatelliteConfigFile {
    /// Microphone recording
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Whisper transcription service
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// Query service (OpenAI-compatible chat completions)
    #[serde(default)]
    pub query: QueryFileConfig,

    /// Speech synthesis
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Speaker playback
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Indicator behaviour
    #[serde(default)]
    pub indicator: IndicatorFileConfig,

    /// Turn admission
    #[serde(default)]
    pub turn: TurnFileConfig,

    /// Wake event listener
    #[serde(default)]
    pub listener: ListenerFileConfig,
}

/// Recorder configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Recorder program (e.g. "arecord")
    pub program: Option<String>,

    /// ALSA device (e.g. "plughw:CARD=seeed2micvoicec,DEV=0")
    pub device: Option<String>,

    /// Recording length in seconds
    pub duration_secs: Option<u64>,
}

/// Transcription service configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// Endpoint receiving the multipart upload
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Query service configuration
#[derive(Debug, Default, Deserialize)]
pub struct QueryFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub timeout_secs: Option<u64>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Player program (e.g. "aplay")
    pub program: Option<String>,

    /// Playback sample rate in Hz
    pub sample_rate: Option<u32>,
}

/// Indicator configuration
#[derive(Debug, Default, Deserialize)]
pub struct IndicatorFileConfig {
    /// Delay before the indicator returns to idle after a turn
    pub reset_delay_ms: Option<u64>,
}

/// Turn admission configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    /// What to do with a wake event while a turn is running
    pub overlap: Option<OverlapPolicy>,
}

/// Listener configuration
#[derive(Debug, Default, Deserialize)]
pub struct ListenerFileConfig {
    /// URI to listen on (e.g. "tcp://0.0.0.0:10700")
    pub uri: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SatelliteConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SatelliteConfigFile {
    let Some(path) = config_file_path() else {
        return SatelliteConfigFile::default();
    };

    if !path.exists() {
        return SatelliteConfigFile::default();
    }

    match load_config_file_at(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            SatelliteConfigFile::default()
        }
    }
}

/// Load an explicitly requested config file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file_at(path: &Path) -> Result<SatelliteConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/voice-satellite/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-satellite").join("config.toml"))
}
