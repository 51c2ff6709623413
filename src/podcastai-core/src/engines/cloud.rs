//! Cloud engine using an OpenAI-compatible `/audio/speech` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::debug;

use super::{EngineInitError, EngineKind, EngineProvider, InitFailureKind, SpeechEngine};
use crate::audio::{decode_pcm16, Waveform};
use crate::config::EnginesConfig;
use crate::error::PodcastError;

/// Rate of the raw PCM the speech endpoint returns.
pub const CLOUD_SAMPLE_RATE: u32 = 24000;

const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Clone)]
pub struct CloudEngineProvider {
    api_base: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl CloudEngineProvider {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
            api_key,
            timeout: Duration::from_secs(120),
        }
    }

    /// Read the key from `OPENAI_TTS_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub fn from_env(config: &EnginesConfig) -> Self {
        let api_key = env::var("OPENAI_TTS_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(&config.cloud_api_base, &config.cloud_model, api_key)
    }
}

#[async_trait]
impl EngineProvider for CloudEngineProvider {
    fn kind(&self) -> EngineKind {
        EngineKind::Cloud
    }

    async fn initialize(&self) -> Result<Box<dyn SpeechEngine>, EngineInitError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            EngineInitError::new(
                self.kind().name(),
                InitFailureKind::MissingDependency,
                "no API key configured for the speech endpoint",
            )
        })?;

        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                EngineInitError::new(
                    self.kind().name(),
                    InitFailureKind::Failed,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Box::new(CloudEngine {
            client,
            endpoint: format!("{}/audio/speech", self.api_base.trim_end_matches('/')),
            model: self.model.clone(),
            api_key,
        }))
    }
}

pub struct CloudEngine {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[async_trait]
impl SpeechEngine for CloudEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cloud
    }

    async fn synthesize(&mut self, text: &str, voice: Option<&str>) -> Result<Waveform, PodcastError> {
        let voice = voice.unwrap_or(DEFAULT_VOICE);
        debug!(voice, chars = text.len(), "Requesting cloud speech");

        let request_body = json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "response_format": "pcm",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PodcastError::Engine(format!("Speech API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PodcastError::Engine(format!(
                "Speech API error ({}): {}",
                status, error_text
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PodcastError::Engine(format!("Failed to read audio response: {}", e)))?;

        if audio.is_empty() {
            return Err(PodcastError::Engine("Speech API returned no audio".to_string()));
        }

        Ok(decode_pcm16(&audio, CLOUD_SAMPLE_RATE))
    }
}
