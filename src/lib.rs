//! Voice Satellite - wake-word voice assistant for small devices
//!
//! On each wake event the satellite records a short utterance, transcribes
//! it, asks a question-answering service, synthesizes the answer and plays
//! it back, while driving a visual indicator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Wake listener (Wyoming, TCP)              │
//! └────────────────────────┬─────────────────────────────┘
//!                          │ run-pipeline
//! ┌────────────────────────▼─────────────────────────────┐
//! │                 Turn orchestrator                    │
//! │  capture → transcribe → query → synthesize → play    │
//! └───────┬──────────────────────────────────────┬───────┘
//!         │                                      │
//! ┌───────▼────────┐                    ┌────────▼───────┐
//! │ arecord/aplay  │                    │   Indicator    │
//! │ Whisper/LLM/TTS│                    │ (debounced)    │
//! └────────────────┘                    └────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod indicator;
pub mod listener;
pub mod turn;
pub mod voice;

pub use config::{Config, OverlapPolicy};
pub use error::{Error, Result};
pub use indicator::{Indicator, IndicatorState};
pub use listener::WakeListener;
pub use turn::{Collaborators, TurnError, TurnOrchestrator, TurnOutcome, TurnSettings, TurnStage};
