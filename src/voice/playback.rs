//! Audio playback to speakers via `aplay`

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ArtifactKind, AudioArtifact, AudioPlayback};
use crate::config::PlaybackConfig;
use crate::{Error, Result};

/// Sample rate for playback (matches the synthesized PCM stream)
pub const PLAYBACK_SAMPLE_RATE: u32 = 22050;

/// Plays raw 16-bit PCM through the default ALSA device
pub struct AplayPlayback {
    config: PlaybackConfig,
}

impl AplayPlayback {
    /// Create a player with the configured format
    #[must_use]
    pub const fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }

    fn args(&self, audio: &AudioArtifact) -> Vec<String> {
        // Recordings carry a WAV header; synthesized speech is headerless
        if audio.kind() == ArtifactKind::Capture {
            return vec![audio.path().display().to_string()];
        }

        vec![
            "-r".to_string(),
            self.config.sample_rate.to_string(),
            "-c".to_string(),
            self.config.channels.to_string(),
            "-f".to_string(),
            "S16_LE".to_string(),
            "-t".to_string(),
            "raw".to_string(),
            audio.path().display().to_string(),
        ]
    }

    async fn run(&self, audio: &AudioArtifact) -> Result<()> {
        let output = Command::new(&self.config.program)
            .args(self.args(audio))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::Playback(format!("failed to spawn {}: {e}", self.config.program))
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(code, stderr = %stderr.trim(), "audio playback failed");
            return Err(Error::Playback(format!(
                "{} exited with code {code}: {}",
                self.config.program,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl AudioPlayback for AplayPlayback {
    async fn play(&self, audio: AudioArtifact) -> Result<()> {
        tracing::debug!(
            path = %audio.path().display(),
            sample_rate = self.config.sample_rate,
            "playing audio"
        );

        let result = self.run(&audio).await;
        audio.discard();

        if result.is_ok() {
            tracing::debug!("playback complete");
        }
        result
    }
}
