//! HTTP client for the ElevenLabs streaming TTS endpoint.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::StatusCode;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::{AudioStream, SynthesisError, SynthesizeRequest, Synthesizer};

/// ElevenLabs API base URL.
pub const BASE_URL: &str = "https://api.elevenlabs.io/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of an error response body is kept in the error message.
const ERROR_BODY_LIMIT: usize = 4096;

/// Client for the ElevenLabs text-to-speech streaming API.
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Constructs a client against a non-default base URL (used by tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsClient {
    async fn synthesize_stream(
        &self,
        voice_id: &str,
        req: SynthesizeRequest,
    ) -> Result<AudioStream, SynthesisError> {
        if voice_id.is_empty() {
            return Err(SynthesisError::MissingVoiceId);
        }
        if req.text.is_empty() {
            return Err(SynthesisError::MissingText);
        }

        // PCM output (16 kHz, 16-bit mono) plays back directly without
        // transcoding.
        let url = format!(
            "{}/text-to-speech/{}/stream?output_format=pcm_16000",
            self.base_url, voice_id
        );

        debug!(voice_id, text_length = req.text.len(), "elevenlabs synthesize_stream");

        let resp = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(bytes)))
    }
}
