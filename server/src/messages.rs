//! Wire messages streamed to the client, one JSON frame each.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStatus {
    Started,
    Playing,
    Finished,
    Interrupted,
    Error,
}

/// One bounded slice of raw PCM audio. `data` travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub sequence: u64,
    pub first: bool,
    pub last: bool,
    pub duration_ms: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisMessage {
    pub status: SynthesisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<AudioChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl SynthesisMessage {
    pub fn status(status: SynthesisStatus, metadata: Option<HashMap<String, String>>) -> Self {
        Self {
            status,
            chunk: None,
            error_message: None,
            metadata,
        }
    }

    pub fn chunk(chunk: AudioChunk) -> Self {
        Self {
            status: SynthesisStatus::Playing,
            chunk: Some(chunk),
            error_message: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SynthesisStatus::Error,
            chunk: None,
            error_message: Some(message.into()),
            metadata: None,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
