//! Voice collaborators
//!
//! The turn pipeline talks to five collaborators through the traits below:
//! capture, transcription, query, synthesis and playback. The concrete
//! adapters shell out to ALSA tools or call HTTP services.
//!
//! Artifacts move by value: a stage that takes an [`AudioArtifact`] owns it
//! and must delete it whether or not its own work succeeds.

mod artifact;
mod capture;
mod playback;
mod query;
mod stt;
mod tts;

use std::time::Duration;

use async_trait::async_trait;

pub use artifact::{ArtifactKind, AudioArtifact};
pub use capture::{ArecordCapture, SAMPLE_RATE, WavSummary, samples_to_wav, verify_wav};
pub use playback::{AplayPlayback, PLAYBACK_SAMPLE_RATE};
pub use query::{PerplexityClient, clean_response};
pub use stt::WhisperService;
pub use tts::ElevenLabsTts;

use crate::Result;

/// Records a bounded-duration audio sample
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Record for `duration` into a fresh capture artifact
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the recorder fails or produces the wrong format
    async fn capture(&self, duration: Duration) -> Result<AudioArtifact>;
}

/// Converts recorded speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio`, deleting it afterwards regardless of outcome
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a malformed response
    async fn transcribe(&self, audio: AudioArtifact) -> Result<String>;
}

/// Answers a text prompt
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Ask `prompt` and return the cleaned answer
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure
    async fn query(&self, prompt: &str) -> Result<String>;
}

/// Converts text to playable audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a fresh synthesis artifact
    ///
    /// # Errors
    ///
    /// Returns error on a non-success response or a broken stream
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact>;
}

/// Plays audio to the speaker
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Play `audio`, deleting it afterwards regardless of outcome
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the player fails
    async fn play(&self, audio: AudioArtifact) -> Result<()>;
}
