//! Speech-to-text (STT) via a self-hosted Whisper service

use async_trait::async_trait;

use super::{AudioArtifact, Transcriber};
use crate::config::TranscriptionConfig;
use crate::{Error, Result};

/// Response from the Whisper service
#[derive(serde::Deserialize)]
struct WhisperServiceResponse {
    transcription: Option<String>,
}

/// Uploads recordings to a Whisper HTTP service
pub struct WhisperService {
    client: reqwest::Client,
    url: String,
}

impl WhisperService {
    /// Create a client for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::Config("Whisper service URL required".to_string()));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    async fn upload(&self, audio: &AudioArtifact) -> Result<String> {
        let bytes = audio.read().await?;
        tracing::debug!(
            audio_bytes = bytes.len(),
            url = %self.url,
            "starting Whisper transcription"
        );

        let file_name = audio
            .path()
            .file_name()
            .map_or_else(|| "audio.wav".to_string(), |n| n.to_string_lossy().into_owned());

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("audio/wav")
                .map_err(|e| Error::Stt(e.to_string()))?,
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper service error");
            return Err(Error::Stt(format!("Whisper service error {status}: {body}")));
        }

        let result: WhisperServiceResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let transcript = result
            .transcription
            .ok_or_else(|| Error::Stt("response missing transcription field".to_string()))?;

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for WhisperService {
    async fn transcribe(&self, audio: AudioArtifact) -> Result<String> {
        let result = self.upload(&audio).await;
        audio.discard();
        result
    }
}
