//! Turn orchestration
//!
//! One wake event becomes one turn: capture → transcribe → query →
//! synthesize → play, strictly in that order. The first failing stage aborts
//! the rest, the indicator drops to idle immediately and the caller gets a
//! [`TurnError`] naming the stage. A successful turn leaves the indicator
//! active and schedules the debounced reset.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, OverlapPolicy};
use crate::indicator::Indicator;
use crate::voice::{
    AplayPlayback, ArecordCapture, AudioCapture, AudioPlayback, ElevenLabsTts, PerplexityClient,
    QueryClient, SpeechSynthesizer, Transcriber, WhisperService,
};
use crate::{Error, Result};

/// Pipeline stage of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    /// Not started, finished, or aborted
    Idle,
    /// Recording the user
    Capturing,
    /// Waiting for the transcript
    Transcribing,
    /// Waiting for the answer
    Querying,
    /// Waiting for synthesized speech
    Synthesizing,
    /// Speaking the answer
    Playing,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Querying => "querying",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Why a turn produced no answer
#[derive(Debug, Error)]
pub enum TurnError {
    /// Another turn was running and the overlap policy is `reject`
    #[error("a turn is already in progress")]
    Busy,

    /// Recording failed
    #[error("capture failed: {0}")]
    Capture(#[source] Error),

    /// Transcription failed or returned nothing
    #[error("transcription failed: {0}")]
    Transcription(#[source] Error),

    /// The query service failed
    #[error("query failed: {0}")]
    Query(#[source] Error),

    /// Speech synthesis failed
    #[error("synthesis failed: {0}")]
    Synthesis(#[source] Error),

    /// Playback failed
    #[error("playback failed: {0}")]
    Playback(#[source] Error),
}

impl TurnError {
    /// The stage that failed, if the turn started at all
    #[must_use]
    pub const fn stage(&self) -> Option<TurnStage> {
        match self {
            Self::Busy => None,
            Self::Capture(_) => Some(TurnStage::Capturing),
            Self::Transcription(_) => Some(TurnStage::Transcribing),
            Self::Query(_) => Some(TurnStage::Querying),
            Self::Synthesis(_) => Some(TurnStage::Synthesizing),
            Self::Playback(_) => Some(TurnStage::Playing),
        }
    }
}

/// Result of a successful turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Turn identifier (matches the `turn_id` log field)
    pub id: Uuid,
    /// What the user said
    pub transcript: String,
    /// What the assistant answered
    pub response: String,
}

/// One pipeline execution, owned by the task running it
///
/// Audio artifacts are not stored here: they move by value from the stage
/// that produces them into the stage that consumes (and deletes) them.
#[derive(Debug)]
struct Turn {
    id: Uuid,
    stage: TurnStage,
    transcript: Option<String>,
    response: Option<String>,
    started: Instant,
}

impl Turn {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: TurnStage::Idle,
            transcript: None,
            response: None,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: TurnStage) {
        tracing::debug!(turn_id = %self.id, from = %self.stage, to = %stage, "turn stage");
        self.stage = stage;
    }

    fn into_outcome(self) -> TurnOutcome {
        TurnOutcome {
            id: self.id,
            transcript: self.transcript.unwrap_or_default(),
            response: self.response.unwrap_or_default(),
        }
    }
}

/// Forces the indicator idle unless the turn completes
///
/// Covers error returns and panics unwinding through the turn alike.
struct AbortGuard<'a> {
    indicator: &'a Indicator,
    armed: bool,
}

impl<'a> AbortGuard<'a> {
    const fn new(indicator: &'a Indicator) -> Self {
        Self {
            indicator,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.indicator.force_idle();
        }
    }
}

/// The five collaborators a turn drives
#[derive(Clone)]
pub struct Collaborators {
    /// Microphone recorder
    pub capture: Arc<dyn AudioCapture>,
    /// Speech-to-text
    pub transcriber: Arc<dyn Transcriber>,
    /// Question answering
    pub query: Arc<dyn QueryClient>,
    /// Text-to-speech
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Speaker
    pub playback: Arc<dyn AudioPlayback>,
}

impl Collaborators {
    /// Build the production adapters from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a required API key or URL is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            capture: Arc::new(ArecordCapture::new(config.capture.clone())),
            transcriber: Arc::new(WhisperService::new(&config.transcription)?),
            query: Arc::new(PerplexityClient::new(&config.query)?),
            synthesizer: Arc::new(ElevenLabsTts::new(
                &config.synthesis,
                config.playback.sample_rate,
            )?),
            playback: Arc::new(AplayPlayback::new(config.playback.clone())),
        })
    }
}

/// Timing and admission settings for turns
#[derive(Debug, Clone, Copy)]
pub struct TurnSettings {
    /// How long to record
    pub capture_duration: Duration,
    /// How long the indicator stays active after a successful turn
    pub reset_delay: Duration,
    /// What to do with a wake event while a turn is running
    pub overlap: OverlapPolicy,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            capture_duration: Duration::from_secs(5),
            reset_delay: Duration::from_secs(5),
            overlap: OverlapPolicy::Reject,
        }
    }
}

impl From<&Config> for TurnSettings {
    fn from(config: &Config) -> Self {
        Self {
            capture_duration: config.capture.duration,
            reset_delay: config.indicator.reset_delay,
            overlap: config.turn.overlap,
        }
    }
}

/// Runs turns on wake events and drives the indicator
pub struct TurnOrchestrator {
    collaborators: Collaborators,
    indicator: Indicator,
    settings: TurnSettings,
    in_flight: tokio::sync::Mutex<()>,
}

impl TurnOrchestrator {
    /// Create an orchestrator over the given collaborators
    #[must_use]
    pub fn new(collaborators: Collaborators, indicator: Indicator, settings: TurnSettings) -> Self {
        Self {
            collaborators,
            indicator,
            settings,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an orchestrator with the production adapters
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator cannot be configured
    pub fn from_config(config: &Config, indicator: Indicator) -> Result<Self> {
        Ok(Self::new(
            Collaborators::from_config(config)?,
            indicator,
            TurnSettings::from(config),
        ))
    }

    /// The indicator this orchestrator drives
    #[must_use]
    pub const fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    /// Run one turn in response to a wake event
    ///
    /// # Errors
    ///
    /// Returns `TurnError::Busy` if a turn is running under the `reject`
    /// policy, otherwise the error of the first stage that failed
    pub async fn handle_wake_word(&self) -> std::result::Result<TurnOutcome, TurnError> {
        let _admitted = match self.settings.overlap {
            OverlapPolicy::Reject => self.in_flight.try_lock().map_err(|_| {
                tracing::warn!("wake word ignored - turn already in progress");
                TurnError::Busy
            })?,
            OverlapPolicy::Queue => self.in_flight.lock().await,
        };

        let mut turn = Turn::new();
        tracing::info!(turn_id = %turn.id, "wake word detected - starting turn");

        self.indicator.activate();
        let guard = AbortGuard::new(&self.indicator);

        match self.run(&mut turn).await {
            Ok(()) => {
                turn.advance(TurnStage::Idle);
                guard.disarm();
                self.indicator.schedule_reset(self.settings.reset_delay);

                tracing::info!(
                    turn_id = %turn.id,
                    elapsed_ms = turn.started.elapsed().as_millis(),
                    "turn complete"
                );
                Ok(turn.into_outcome())
            }
            Err(e) => {
                tracing::error!(
                    turn_id = %turn.id,
                    stage = %turn.stage,
                    error = %e,
                    "turn aborted"
                );
                turn.advance(TurnStage::Idle);
                drop(guard);
                Err(e)
            }
        }
    }

    async fn run(&self, turn: &mut Turn) -> std::result::Result<(), TurnError> {
        let c = &self.collaborators;

        turn.advance(TurnStage::Capturing);
        let recording = c
            .capture
            .capture(self.settings.capture_duration)
            .await
            .map_err(TurnError::Capture)?;

        turn.advance(TurnStage::Transcribing);
        let transcript = c
            .transcriber
            .transcribe(recording)
            .await
            .map_err(TurnError::Transcription)?;
        if transcript.trim().is_empty() {
            return Err(TurnError::Transcription(Error::Stt(
                "empty transcription".to_string(),
            )));
        }
        tracing::info!(turn_id = %turn.id, transcript = %transcript, "transcription");
        turn.transcript = Some(transcript);

        turn.advance(TurnStage::Querying);
        let prompt = turn.transcript.as_deref().unwrap_or_default();
        let response = c.query.query(prompt).await.map_err(TurnError::Query)?;
        turn.response = Some(response);

        turn.advance(TurnStage::Synthesizing);
        let answer = turn.response.as_deref().unwrap_or_default();
        let speech = c
            .synthesizer
            .synthesize(answer)
            .await
            .map_err(TurnError::Synthesis)?;

        turn.advance(TurnStage::Playing);
        c.playback.play(speech).await.map_err(TurnError::Playback)?;

        Ok(())
    }
}
