//! Audio capture from the microphone via `arecord`

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ArtifactKind, AudioArtifact, AudioCapture};
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Format facts read back from a recorded WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSummary {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Number of frames
    pub frames: u32,
}

/// Records from an ALSA device with `arecord`
pub struct ArecordCapture {
    config: CaptureConfig,
}

impl ArecordCapture {
    /// Create a recorder for the configured device
    #[must_use]
    pub const fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Build the recorder arguments for one capture
    fn args(&self, seconds: u64, output: &Path) -> Vec<String> {
        vec![
            "-D".to_string(),
            self.config.device.clone(),
            "-r".to_string(),
            self.config.sample_rate.to_string(),
            "-c".to_string(),
            self.config.channels.to_string(),
            "-f".to_string(),
            "S16_LE".to_string(),
            "-d".to_string(),
            seconds.to_string(),
            "-t".to_string(),
            "wav".to_string(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl AudioCapture for ArecordCapture {
    async fn capture(&self, duration: Duration) -> Result<AudioArtifact> {
        // arecord only takes whole seconds
        let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        if seconds == 0 {
            return Err(Error::Capture("capture duration must be positive".to_string()));
        }

        let artifact = AudioArtifact::reserve(ArtifactKind::Capture)
            .map_err(|e| Error::Capture(format!("failed to create capture file: {e}")))?;
        let args = self.args(seconds, artifact.path());

        tracing::debug!(
            program = %self.config.program,
            args = %args.join(" "),
            "starting audio capture"
        );

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::Capture(format!("failed to spawn {}: {e}", self.config.program))
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(code, stderr = %stderr.trim(), "audio capture failed");
            return Err(Error::Capture(format!(
                "{} exited with code {code}: {}",
                self.config.program,
                stderr.trim()
            )));
        }

        let summary = verify_wav(
            artifact.path(),
            self.config.sample_rate,
            self.config.channels,
        )?;

        tracing::debug!(
            path = %artifact.path().display(),
            frames = summary.frames,
            "audio captured"
        );
        Ok(artifact)
    }
}

/// Check that a WAV file is 16-bit PCM with the expected rate and channels
///
/// # Errors
///
/// Returns `Error::Capture` if the file is unreadable or has the wrong format
pub fn verify_wav(path: &Path, sample_rate: u32, channels: u16) -> Result<WavSummary> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| Error::Capture(format!("unreadable recording: {e}")))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Capture(format!(
            "expected 16-bit PCM, got {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    if spec.sample_rate != sample_rate || spec.channels != channels {
        return Err(Error::Capture(format!(
            "expected {sample_rate} Hz x{channels}, got {} Hz x{}",
            spec.sample_rate, spec.channels
        )));
    }

    Ok(WavSummary {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration(),
    })
}

/// Convert f32 samples to mono 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Capture(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Capture(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Capture(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn capture_with(program: &str) -> ArecordCapture {
        ArecordCapture::new(CaptureConfig {
            program: program.to_string(),
            ..CaptureConfig::default()
        })
    }

    #[test]
    fn test_args_match_recorder_contract() {
        let capture = capture_with("arecord");
        let args = capture.args(5, Path::new("/tmp/out.wav"));

        assert_eq!(
            args,
            vec![
                "-D",
                "plughw:CARD=seeed2micvoicec,DEV=0",
                "-r",
                "16000",
                "-c",
                "1",
                "-f",
                "S16_LE",
                "-d",
                "5",
                "-t",
                "wav",
                "/tmp/out.wav",
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let err = capture_with("true").capture(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_capture_error() {
        let err = capture_with("false")
            .capture(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(msg) if msg.contains("exited with code")));
    }

    #[tokio::test]
    async fn test_missing_recorder_is_capture_error() {
        let err = capture_with("definitely-not-a-recorder")
            .capture(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(msg) if msg.contains("failed to spawn")));
    }

    #[tokio::test]
    async fn test_empty_recording_is_capture_error() {
        // `true` exits 0 without writing anything
        let err = capture_with("true")
            .capture(Duration::from_millis(1500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(msg) if msg.contains("unreadable")));
    }

    #[test]
    fn test_verify_wav_accepts_capture_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        std::fs::write(&path, samples_to_wav(&[0.0; 1600], SAMPLE_RATE).unwrap()).unwrap();

        let summary = verify_wav(&path, SAMPLE_RATE, 1).unwrap();
        assert_eq!(summary.frames, 1600);
        assert_eq!(summary.channels, 1);
    }

    #[test]
    fn test_verify_wav_rejects_wrong_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.wav");
        std::fs::write(&path, samples_to_wav(&[0.0; 100], 44_100).unwrap()).unwrap();

        let err = verify_wav(&path, SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, Error::Capture(msg) if msg.contains("44100")));
    }

    /// Stand-in recorder that copies `source` to its last argument
    fn recorder_copying(dir: &Path, source: &Path) -> String {
        let script = dir.join("fake-arecord");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nfor last; do :; done\ncp '{}' \"$last\"\n",
                source.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    #[tokio::test]
    async fn test_conforming_recording_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("speech.wav");
        std::fs::write(&source, samples_to_wav(&[0.0; 1600], SAMPLE_RATE).unwrap()).unwrap();

        let artifact = capture_with(&recorder_copying(dir.path(), &source))
            .capture(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(artifact.kind(), ArtifactKind::Capture);
        let summary = verify_wav(artifact.path(), SAMPLE_RATE, 1).unwrap();
        assert_eq!(summary.frames, 1600);

        let path = artifact.path().to_path_buf();
        artifact.release().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_wrong_rate_recording_is_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fast.wav");
        std::fs::write(&source, samples_to_wav(&[0.0; 100], 44_100).unwrap()).unwrap();

        let err = capture_with(&recorder_copying(dir.path(), &source))
            .capture(Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Capture(msg) if msg.contains("got 44100 Hz")));
    }
}
