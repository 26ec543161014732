//! Per-request streaming coordinator.
//!
//! Turns either a cached blob or a live synthesis byte stream into the
//! ordered status/chunk message sequence
//! `STARTED → PLAYING… → FINISHED | INTERRUPTED | ERROR`, with identical
//! chunking and timing metadata on both paths.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use audio_cache::{cache_key, AudioCache};
use tts_core::{SynthesizeRequest, Synthesizer, VoiceSettings};

use crate::config::AdapterConfig;
use crate::manifest::AdapterManifest;
use crate::messages::{AudioChunk, SynthesisMessage, SynthesisStatus};

/// Bytes per emitted chunk (~128 ms at 16 kHz mono PCM16).
pub const CHUNK_SIZE: usize = 4096;

const SAMPLE_RATE: u32 = 16_000;
const BYTES_PER_SAMPLE: u32 = 2;

/// Per-chunk playback duration, truncating division on exactly this chunk's
/// byte count. No cross-chunk drift correction.
fn chunk_duration_ms(bytes: usize) -> u32 {
    (bytes as u32 / BYTES_PER_SAMPLE) * 1000 / SAMPLE_RATE
}

/// Returns the effective language code for the upstream request, combining
/// the configured mode with the per-request hint.
///
/// Modes:
///   - "client": use the request hint when non-blank, else "auto".
///   - "auto":   always "auto" (upstream auto-detects, language omitted).
///   - other:    the configured code verbatim, hint ignored.
pub fn resolve_language(config_lang: &str, hint: Option<&str>) -> String {
    if config_lang != "client" {
        return config_lang.to_string();
    }
    match hint.map(str::trim) {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => "auto".to_string(),
    }
}

/// A synthesis request as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub text: String,
    /// Language hint, honored only in "client" mode.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
}

#[derive(Debug, Error)]
#[error("sink closed: {0}")]
pub struct SinkError(pub String);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Strictly ordered outbound message port. A send blocks until the transport
/// has accepted the message; a send error is an unrecoverable termination of
/// the request.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, msg: SynthesisMessage) -> Result<(), SinkError>;
}

/// Cooperative cancellation flag carrying the reason it was tripped.
/// Observed by the coordinator between reads and sends, never mid-send.
#[derive(Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| "canceled".to_string())
    }
}

/// Synthesis parameters fixed at process start.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub model: String,
    pub voice_id: String,
    /// Language mode: "client", "auto", or a fixed code.
    pub language: String,
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub optimize_streaming_latency: Option<u8>,
    /// Attached verbatim to every emitted chunk.
    pub chunk_metadata: HashMap<String, String>,
}

impl SynthesisOptions {
    pub fn from_config(cfg: &AdapterConfig, manifest: &AdapterManifest) -> Self {
        Self {
            model: cfg.model.clone(),
            voice_id: cfg.voice_id.clone(),
            language: cfg.language.clone(),
            stability: cfg.stability,
            similarity_boost: cfg.similarity_boost,
            optimize_streaming_latency: cfg.optimize_streaming_latency,
            chunk_metadata: manifest.synthesis_metadata(&cfg.model, &cfg.voice_id),
        }
    }
}

/// Drives one synthesis request from validation to a terminal status.
pub struct StreamCoordinator {
    opts: SynthesisOptions,
    synthesizer: Arc<dyn Synthesizer>,
    cache: Option<Arc<AudioCache>>,
}

impl StreamCoordinator {
    pub fn new(
        opts: SynthesisOptions,
        synthesizer: Arc<dyn Synthesizer>,
        cache: Option<Arc<AudioCache>>,
    ) -> Self {
        Self {
            opts,
            synthesizer,
            cache,
        }
    }

    /// Runs one request to completion. Messages are emitted in order; the
    /// first is `STARTED` (unless validation fails), the last is exactly one
    /// of `FINISHED`, `INTERRUPTED`, or `ERROR`.
    pub async fn run<S: MessageSink>(
        &self,
        req: StreamRequest,
        sink: &mut S,
        cancel: &CancelSignal,
    ) -> Result<(), StreamError> {
        let session_id = req.session_id.as_deref().unwrap_or("");
        let stream_id = req.stream_id.as_deref().unwrap_or("");
        let text = req.text.as_str();

        if text.is_empty() {
            warn!(session_id, stream_id, "empty text in synthesis request");
            return Err(self.fail(sink, "text is required").await);
        }

        let language = resolve_language(&self.opts.language, req.language.as_deref());
        info!(
            session_id,
            stream_id,
            text_length = text.len(),
            language = %language,
            "synthesis request received"
        );

        sink.send(SynthesisMessage::status(SynthesisStatus::Started, None))
            .await?;

        let key = cache_key(
            text,
            &self.opts.model,
            &self.opts.voice_id,
            &language,
            self.opts.stability,
            self.opts.similarity_boost,
            self.opts.optimize_streaming_latency,
        );

        if let Some(cache) = &self.cache {
            if let Some(data) = cache.get(&key) {
                info!(key = %key, "cache hit");
                return self.replay_cached(&data, text, sink, cancel).await;
            }
            debug!(key = %key, "cache miss");
        }

        self.stream_live(text, &language, &key, sink, cancel).await
    }

    /// Streams pre-cached audio using the same chunking rules as the live
    /// path.
    async fn replay_cached<S: MessageSink>(
        &self,
        data: &[u8],
        text: &str,
        sink: &mut S,
        cancel: &CancelSignal,
    ) -> Result<(), StreamError> {
        sink.send(SynthesisMessage::status(SynthesisStatus::Playing, None))
            .await?;

        let total_chunks = data.len().div_ceil(CHUNK_SIZE);
        let mut sequence: u64 = 0;

        for piece in data.chunks(CHUNK_SIZE) {
            if cancel.is_cancelled() {
                let reason = cancel.reason();
                info!(reason = %reason, "cache replay interrupted");
                sink.send(interrupted(reason)).await?;
                return Ok(());
            }

            sequence += 1;
            sink.send(SynthesisMessage::chunk(AudioChunk {
                data: piece.to_vec(),
                sequence,
                first: sequence == 1,
                last: sequence as usize == total_chunks,
                duration_ms: chunk_duration_ms(piece.len()),
                metadata: self.opts.chunk_metadata.clone(),
            }))
            .await?;
        }

        info!(total_bytes = data.len(), chunks = sequence, "served from cache");

        let metadata = HashMap::from([
            ("total_bytes".to_string(), data.len().to_string()),
            ("total_chunks".to_string(), sequence.to_string()),
            ("text_length".to_string(), text.len().to_string()),
            ("source".to_string(), "cache".to_string()),
        ]);
        sink.send(SynthesisMessage::status(SynthesisStatus::Finished, Some(metadata)))
            .await?;
        Ok(())
    }

    /// Calls the upstream synthesizer and streams its bytes, accumulating
    /// them for the cache when one is configured.
    async fn stream_live<S: MessageSink>(
        &self,
        text: &str,
        language: &str,
        key: &str,
        sink: &mut S,
        cancel: &CancelSignal,
    ) -> Result<(), StreamError> {
        sink.send(SynthesisMessage::status(SynthesisStatus::Playing, None))
            .await?;

        let mut synth_req = SynthesizeRequest {
            text: text.to_string(),
            model_id: Some(self.opts.model.clone()),
            ..Default::default()
        };
        // "auto" means let the upstream detect the language, so the field is
        // omitted entirely.
        if language != "auto" {
            synth_req.language_code = Some(language.to_string());
        }
        if self.opts.stability.is_some() || self.opts.similarity_boost.is_some() {
            synth_req.voice_settings = Some(VoiceSettings {
                stability: self.opts.stability,
                similarity_boost: self.opts.similarity_boost,
            });
        }
        synth_req.optimize_streaming_latency = self.opts.optimize_streaming_latency;

        let start = Instant::now();
        let mut stream = match self
            .synthesizer
            .synthesize_stream(&self.opts.voice_id, synth_req)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "upstream synthesis failed");
                return Err(self.fail(sink, &format!("synthesis failed: {err}")).await);
            }
        };

        let mut sequence: u64 = 0;
        let mut total_bytes: usize = 0;
        let mut accumulated: Vec<u8> = Vec::new();
        // One chunk of read-ahead so the final read can be flagged `last`.
        let mut pending: Option<Vec<u8>> = None;
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            if cancel.is_cancelled() {
                let reason = cancel.reason();
                info!(reason = %reason, "synthesis interrupted");
                sink.send(interrupted(reason)).await?;
                // Do not cache a partial result.
                return Ok(());
            }

            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => {
                    error!(error = %err, "error reading audio stream");
                    return Err(self.fail(sink, &format!("stream read error: {err}")).await);
                }
            };

            if n == 0 {
                if let Some(data) = pending.take() {
                    sequence += 1;
                    total_bytes += data.len();
                    if self.cache.is_some() {
                        accumulated.extend_from_slice(&data);
                    }
                    self.emit_live_chunk(sink, data, sequence, true).await?;
                }
                break;
            }

            if let Some(data) = pending.take() {
                sequence += 1;
                total_bytes += data.len();
                if self.cache.is_some() {
                    accumulated.extend_from_slice(&data);
                }
                self.emit_live_chunk(sink, data, sequence, false).await?;
            }
            pending = Some(buf[..n].to_vec());
        }

        let elapsed = start.elapsed();
        info!(
            total_bytes,
            chunks = sequence,
            duration_sec = elapsed.as_secs_f64(),
            "synthesis completed"
        );

        if let Some(cache) = &self.cache {
            if !accumulated.is_empty() {
                // Best-effort: a cache write failure never fails the request.
                if let Err(err) = cache.put(key, &accumulated) {
                    warn!(error = %err, "failed to store in cache");
                }
            }
        }

        let metadata = HashMap::from([
            ("total_bytes".to_string(), total_bytes.to_string()),
            ("total_chunks".to_string(), sequence.to_string()),
            ("duration_sec".to_string(), format!("{:.2}", elapsed.as_secs_f64())),
            ("text_length".to_string(), text.len().to_string()),
        ]);
        sink.send(SynthesisMessage::status(SynthesisStatus::Finished, Some(metadata)))
            .await?;
        Ok(())
    }

    async fn emit_live_chunk<S: MessageSink>(
        &self,
        sink: &mut S,
        data: Vec<u8>,
        sequence: u64,
        last: bool,
    ) -> Result<(), SinkError> {
        let duration_ms = chunk_duration_ms(data.len());
        debug!(sequence, bytes = data.len(), duration_ms, "sending audio chunk");
        sink.send(SynthesisMessage::chunk(AudioChunk {
            data,
            sequence,
            first: sequence == 1,
            last,
            duration_ms,
            metadata: self.opts.chunk_metadata.clone(),
        }))
        .await
    }

    /// Emits a terminal `ERROR` message and returns the matching call
    /// failure. A broken sink takes precedence: nothing can be delivered on
    /// a dead transport.
    async fn fail<S: MessageSink>(&self, sink: &mut S, message: &str) -> StreamError {
        if let Err(err) = sink.send(SynthesisMessage::error(message)).await {
            return StreamError::Sink(err);
        }
        StreamError::Synthesis(message.to_string())
    }
}

fn interrupted(reason: String) -> SynthesisMessage {
    SynthesisMessage::status(
        SynthesisStatus::Interrupted,
        Some(HashMap::from([("reason".to_string(), reason)])),
    )
}
