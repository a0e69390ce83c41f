//! Text-to-speech (TTS) via the ElevenLabs streaming API

use std::io::Cursor;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;

use super::{ArtifactKind, AudioArtifact, SpeechSynthesizer};
use crate::config::SynthesisConfig;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(serde::Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Streams synthesized speech into a raw PCM artifact
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    voice_id: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    sample_rate: u32,
}

impl ElevenLabsTts {
    /// Create a TTS client producing 16-bit mono PCM at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new(config: &SynthesisConfig, sample_rate: u32) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            sample_rate,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/text-to-speech/{}/stream?output_format=pcm_{}",
            self.base_url, self.voice_id, self.sample_rate
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact> {
        tracing::debug!(
            chars = text.len(),
            voice = %self.voice_id,
            "starting ElevenLabs synthesis"
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/*")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ElevenLabs API error");
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let is_mp3 = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("audio/mpeg"));

        // Decode before creating the artifact so a bad body leaves no file behind
        let body = if is_mp3 {
            let mp3 = response.bytes().await?;
            Ok(decode_mp3_to_pcm(&mp3, self.sample_rate)?)
        } else {
            Err(response)
        };

        let (artifact, mut file) = AudioArtifact::create(ArtifactKind::Synthesis)?;

        let written = match body {
            Ok(pcm) => {
                file.write_all(&pcm).await?;
                pcm.len()
            }
            Err(response) => {
                let mut stream = response.bytes_stream();
                let mut total = 0;
                while let Some(chunk) = stream.next().await {
                    let chunk =
                        chunk.map_err(|e| Error::Tts(format!("audio stream broke: {e}")))?;
                    file.write_all(&chunk).await?;
                    total += chunk.len();
                }
                total
            }
        };

        file.flush().await?;
        drop(file);

        if written == 0 {
            return Err(Error::Tts("empty audio stream".to_string()));
        }

        tracing::debug!(bytes = written, path = %artifact.path().display(), "speech synthesized");
        Ok(artifact)
    }
}

/// Decode MP3 bytes to mono 16-bit little-endian PCM
fn decode_mp3_to_pcm(mp3_data: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut pcm = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if u32::try_from(frame.sample_rate).ok() != Some(sample_rate) {
                    return Err(Error::Tts(format!(
                        "MP3 sample rate {} does not match playback rate {sample_rate}",
                        frame.sample_rate
                    )));
                }

                mix_to_mono(&frame.data, frame.channels, &mut pcm);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Tts(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(pcm)
}

/// Append interleaved samples to `pcm` as mono S16_LE, averaging channels
fn mix_to_mono(samples: &[i16], channels: usize, pcm: &mut Vec<u8>) {
    if channels <= 1 {
        for sample in samples {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        return;
    }

    for frame in samples.chunks(channels) {
        let sum: i32 = frame.iter().copied().map(i32::from).sum();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let mono = (sum / frame.len() as i32) as i16;
        pcm.extend_from_slice(&mono.to_le_bytes());
    }
}
