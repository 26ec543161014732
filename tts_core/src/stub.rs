//! Deterministic stub synthesizer for CI and offline environments.

use async_trait::async_trait;
use tracing::info;

use crate::{AudioStream, SynthesisError, SynthesizeRequest, Synthesizer};

/// 320 bytes ≈ 10 ms of audio at 16 kHz mono PCM16.
const BYTES_PER_CHAR: usize = 320;

/// Synthesizer that emits silent PCM sized proportionally to the input text.
/// Responses are deterministic and never touch the network.
#[derive(Debug, Default)]
pub struct StubSynthesizer;

impl StubSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
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

        let pcm = vec![0u8; req.text.len() * BYTES_PER_CHAR];

        info!(
            text_length = req.text.len(),
            voice_id,
            bytes = pcm.len(),
            "stub synthesis"
        );

        Ok(Box::new(std::io::Cursor::new(pcm)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn request(text: &str) -> SynthesizeRequest {
        SynthesizeRequest {
            text: text.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn output_is_silence_proportional_to_text_length() {
        let stub = StubSynthesizer::new();
        let mut stream = stub.synthesize_stream("voice", request("abcd")).await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 4 * BYTES_PER_CHAR);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn identical_requests_produce_identical_output() {
        let stub = StubSynthesizer::new();
        let mut a = Vec::new();
        let mut b = Vec::new();
        stub.synthesize_stream("voice", request("same text"))
            .await
            .unwrap()
            .read_to_end(&mut a)
            .await
            .unwrap();
        stub.synthesize_stream("voice", request("same text"))
            .await
            .unwrap()
            .read_to_end(&mut b)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn rejects_empty_inputs() {
        let stub = StubSynthesizer::new();
        assert!(matches!(
            stub.synthesize_stream("", request("hi")).await.err().unwrap(),
            SynthesisError::MissingVoiceId
        ));
        assert!(matches!(
            stub.synthesize_stream("voice", request("")).await.err().unwrap(),
            SynthesisError::MissingText
        ));
    }
}
