//! Shared test utilities: in-memory collaborators that count their calls

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use voice_satellite::voice::{
    ArtifactKind, AudioArtifact, AudioCapture, AudioPlayback, QueryClient, SAMPLE_RATE,
    SpeechSynthesizer, Transcriber, samples_to_wav,
};
use voice_satellite::{Collaborators, Error, Result};

/// Call counter plus an on/off failure switch
#[derive(Default)]
pub struct Probe {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn hit(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fail.load(Ordering::SeqCst)
    }
}

/// Writes a short silent WAV recording
#[derive(Default)]
pub struct FakeCapture {
    pub probe: Probe,
    pub recorded: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn capture(&self, _duration: Duration) -> Result<AudioArtifact> {
        if self.probe.hit() {
            return Err(Error::Capture("arecord exited with code 1".to_string()));
        }

        let wav = samples_to_wav(&[0.0; 1600], SAMPLE_RATE)?;
        let (artifact, mut file) = AudioArtifact::create(ArtifactKind::Capture)?;
        file.write_all(&wav).await?;
        file.flush().await?;

        self.recorded.lock().push(artifact.path().to_path_buf());
        Ok(artifact)
    }
}

/// Returns a fixed transcript
pub struct FakeTranscriber {
    pub probe: Probe,
    pub transcript: Mutex<String>,
}

impl Default for FakeTranscriber {
    fn default() -> Self {
        Self {
            probe: Probe::default(),
            transcript: Mutex::new("hello".to_string()),
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: AudioArtifact) -> Result<String> {
        let failed = self.probe.hit();
        audio.discard();
        if failed {
            return Err(Error::Stt("Whisper service error 500".to_string()));
        }
        Ok(self.transcript.lock().clone())
    }
}

/// Returns a fixed answer
#[derive(Default)]
pub struct FakeQuery {
    pub probe: Probe,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl QueryClient for FakeQuery {
    async fn query(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if self.probe.hit() {
            return Err(Error::Query("Perplexity API error 401".to_string()));
        }
        Ok("Hi there.".to_string())
    }
}

/// Writes a few bytes of PCM
#[derive(Default)]
pub struct FakeSynthesizer {
    pub probe: Probe,
    pub produced: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioArtifact> {
        if self.probe.hit() {
            return Err(Error::Tts("ElevenLabs TTS error 429".to_string()));
        }

        let (artifact, mut file) = AudioArtifact::create(ArtifactKind::Synthesis)?;
        file.write_all(&[0, 0, 1, 0]).await?;
        file.flush().await?;

        self.produced.lock().push(artifact.path().to_path_buf());
        Ok(artifact)
    }
}

/// Optionally sleeps to simulate speaking, then deletes the audio
#[derive(Default)]
pub struct FakePlayback {
    pub probe: Probe,
    pub delay: Mutex<Duration>,
}

#[async_trait]
impl AudioPlayback for FakePlayback {
    async fn play(&self, audio: AudioArtifact) -> Result<()> {
        let failed = self.probe.hit();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        audio.discard();
        if failed {
            return Err(Error::Playback("aplay exited with code 1".to_string()));
        }
        Ok(())
    }
}

/// One of each fake, all succeeding by default
#[derive(Default, Clone)]
pub struct Fakes {
    pub capture: Arc<FakeCapture>,
    pub transcriber: Arc<FakeTranscriber>,
    pub query: Arc<FakeQuery>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub playback: Arc<FakePlayback>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            capture: self.capture.clone(),
            transcriber: self.transcriber.clone(),
            query: self.query.clone(),
            synthesizer: self.synthesizer.clone(),
            playback: self.playback.clone(),
        }
    }

    /// Every artifact any fake has produced
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = self.capture.recorded.lock().clone();
        paths.extend(self.synthesizer.produced.lock().iter().cloned());
        paths
    }

    /// Calls per stage: capture, transcribe, query, synthesize, play
    pub fn calls(&self) -> [usize; 5] {
        [
            self.capture.probe.calls(),
            self.transcriber.probe.calls(),
            self.query.probe.calls(),
            self.synthesizer.probe.calls(),
            self.playback.probe.calls(),
        ]
    }
}
