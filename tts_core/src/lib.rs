//! Upstream synthesis client core.
//!
//! Defines the [`Synthesizer`] seam the streaming server talks to, the
//! request types it sends, and two implementations: [`ElevenLabsClient`]
//! for the real API and [`StubSynthesizer`] for CI and offline runs.
//!
//! All implementations return raw PCM audio: 16-bit signed little-endian,
//! mono, 16000 Hz.

pub mod client;
pub mod stub;

pub use client::ElevenLabsClient;
pub use stub::StubSynthesizer;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Streaming PCM audio returned by a synthesizer. Read until EOF and drop
/// to release the underlying connection.
pub type AudioStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("voice_id is required")]
    MissingVoiceId,

    #[error("text is required")]
    MissingText,

    #[error("http request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

/// Optional voice tuning parameters. Each field is serialized only when
/// explicitly set; the upstream default and an explicit value are distinct
/// requests.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
}

/// A single TTS synthesis request.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_settings: Option<VoiceSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_streaming_latency: Option<u8>,
}

/// Seam between the streaming server and the upstream TTS provider.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Starts a streaming synthesis call and returns the PCM byte stream.
    /// Fails before any I/O when `voice_id` or the request text is empty.
    async fn synthesize_stream(
        &self,
        voice_id: &str,
        req: SynthesizeRequest,
    ) -> Result<AudioStream, SynthesisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_omits_unset_optionals() {
        let req = SynthesizeRequest {
            text: "hello".into(),
            model_id: Some("eleven_turbo_v2_5".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"text": "hello", "model_id": "eleven_turbo_v2_5"})
        );
    }

    #[test]
    fn request_serialization_keeps_explicit_zero_settings() {
        let req = SynthesizeRequest {
            text: "hello".into(),
            voice_settings: Some(VoiceSettings {
                stability: Some(0.0),
                similarity_boost: None,
            }),
            optimize_streaming_latency: Some(0),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "text": "hello",
                "voice_settings": {"stability": 0.0},
                "optimize_streaming_latency": 0
            })
        );
    }
}
