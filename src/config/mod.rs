//! Configuration management for the voice satellite
//!
//! Built once at startup (env > TOML file > defaults) and handed to each
//! collaborator constructor.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::voice::{PLAYBACK_SAMPLE_RATE, SAMPLE_RATE};
use crate::{Error, Result};

use file::SatelliteConfigFile;

/// Recording device on the reSpeaker 2-mic HAT
pub const DEFAULT_CAPTURE_DEVICE: &str = "plughw:CARD=seeed2micvoicec,DEV=0";

/// System prompt sent with every query
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that provides clear, \
concise answers with an academic tone while remaining approachable. Focus on providing \
accurate, well-structured responses. Do not include citations or references in your response.";

/// Voice satellite configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Microphone recording
    pub capture: CaptureConfig,

    /// Whisper transcription service
    pub transcription: TranscriptionConfig,

    /// Query service
    pub query: QueryConfig,

    /// Speech synthesis service
    pub synthesis: SynthesisConfig,

    /// Speaker playback
    pub playback: PlaybackConfig,

    /// Indicator behaviour
    pub indicator: IndicatorConfig,

    /// Turn admission
    pub turn: TurnConfig,

    /// Wake event listener
    pub listener: ListenerConfig,
}

/// Recorder configuration (mono, 16-bit, 16 kHz WAV)
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Recorder program
    pub program: String,

    /// ALSA device identifier
    pub device: String,

    /// Recording length
    pub duration: Duration,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: "arecord".to_string(),
            device: DEFAULT_CAPTURE_DEVICE.to_string(),
            duration: Duration::from_secs(5),
            sample_rate: SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Transcription service configuration
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Endpoint receiving the multipart upload
    pub url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000/transcribe".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Query service configuration
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Bearer key (`PERPLEXITY_API_KEY`)
    pub api_key: Option<SecretString>,

    /// API base URL; `/chat/completions` is appended
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// System prompt
    pub system_prompt: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.perplexity.ai".to_string(),
            model: "llama-3.1-sonar-small-128k-online".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// `xi-api-key` header value (`ELEVENLABS_API_KEY`)
    pub api_key: Option<SecretString>,

    /// API base URL
    pub base_url: String,

    /// Voice identifier
    pub voice_id: String,

    /// Model identifier
    pub model_id: String,

    /// Voice stability (0.0 to 1.0)
    pub stability: f32,

    /// Voice similarity boost (0.0 to 1.0)
    pub similarity_boost: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "2kIQVvX5soUslVRLDDum".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Playback configuration (mono, 16-bit raw PCM)
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Player program
    pub program: String,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            program: "aplay".to_string(),
            sample_rate: PLAYBACK_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Indicator configuration
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    /// Delay before returning to idle after a successful turn
    pub reset_delay: Duration,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            reset_delay: Duration::from_secs(5),
        }
    }
}

/// What happens to a wake event that arrives while a turn is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the event; the caller gets `TurnError::Busy`
    #[default]
    Reject,
    /// Wait for the running turn, then start
    Queue,
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "queue" => Ok(Self::Queue),
            other => Err(Error::Config(format!("unknown overlap policy: {other}"))),
        }
    }
}

/// Turn admission configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnConfig {
    /// Policy for overlapping wake events
    pub overlap: OverlapPolicy,
}

/// Wake listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// URI to listen on
    pub uri: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            uri: "tcp://0.0.0.0:10700".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if an environment override cannot be parsed
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from the environment and an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or an override cannot be parsed
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let fc = file::load_config_file_at(path)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an environment override cannot be parsed
    pub fn resolve<F>(fc: SatelliteConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let capture = {
            let default = CaptureConfig::default();
            let duration_secs = parse_env(&env, "SATELLITE_CAPTURE_SECS")?
                .or(fc.capture.duration_secs);
            CaptureConfig {
                program: fc.capture.program.unwrap_or(default.program),
                device: env("SATELLITE_CAPTURE_DEVICE")
                    .or(fc.capture.device)
                    .unwrap_or(default.device),
                duration: duration_secs.map_or(default.duration, Duration::from_secs),
                ..default
            }
        };

        let transcription = {
            let default = TranscriptionConfig::default();
            TranscriptionConfig {
                url: env("WHISPER_URL")
                    .or(fc.transcription.url)
                    .unwrap_or(default.url),
                timeout: fc
                    .transcription
                    .timeout_secs
                    .map_or(default.timeout, Duration::from_secs),
            }
        };

        let query = {
            let default = QueryConfig::default();
            QueryConfig {
                api_key: env("PERPLEXITY_API_KEY")
                    .or(fc.query.api_key)
                    .filter(|k| !k.is_empty())
                    .map(SecretString::from),
                base_url: env("PERPLEXITY_BASE_URL")
                    .or(fc.query.base_url)
                    .unwrap_or(default.base_url),
                model: env("PERPLEXITY_MODEL")
                    .or(fc.query.model)
                    .unwrap_or(default.model),
                system_prompt: fc.query.system_prompt.unwrap_or(default.system_prompt),
                timeout: fc
                    .query
                    .timeout_secs
                    .map_or(default.timeout, Duration::from_secs),
            }
        };

        let synthesis = {
            let default = SynthesisConfig::default();
            SynthesisConfig {
                api_key: env("ELEVENLABS_API_KEY")
                    .or(fc.synthesis.api_key)
                    .filter(|k| !k.is_empty())
                    .map(SecretString::from),
                base_url: fc.synthesis.base_url.unwrap_or(default.base_url),
                voice_id: env("ELEVENLABS_VOICE_ID")
                    .or(fc.synthesis.voice_id)
                    .unwrap_or(default.voice_id),
                model_id: fc.synthesis.model_id.unwrap_or(default.model_id),
                stability: fc.synthesis.stability.unwrap_or(default.stability),
                similarity_boost: fc
                    .synthesis
                    .similarity_boost
                    .unwrap_or(default.similarity_boost),
                timeout: fc
                    .synthesis
                    .timeout_secs
                    .map_or(default.timeout, Duration::from_secs),
            }
        };

        let playback = {
            let default = PlaybackConfig::default();
            PlaybackConfig {
                program: fc.playback.program.unwrap_or(default.program),
                sample_rate: fc.playback.sample_rate.unwrap_or(default.sample_rate),
                ..default
            }
        };

        let indicator = IndicatorConfig {
            reset_delay: fc
                .indicator
                .reset_delay_ms
                .map_or(IndicatorConfig::default().reset_delay, Duration::from_millis),
        };

        let turn = TurnConfig {
            overlap: parse_env(&env, "SATELLITE_OVERLAP")?
                .or(fc.turn.overlap)
                .unwrap_or_default(),
        };

        let listener = ListenerConfig {
            uri: env("SATELLITE_URI")
                .or(fc.listener.uri)
                .unwrap_or_else(|| ListenerConfig::default().uri),
        };

        if capture.duration.is_zero() {
            return Err(Error::Config(
                "capture duration must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            capture,
            transcription,
            query,
            synthesis,
            playback,
            indicator,
            turn,
            listener,
        })
    }
}

/// Parse an optional environment override
fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}
