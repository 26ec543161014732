//! Common utilities for integration tests

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;

use server::stream::{StreamCoordinator, SynthesisOptions};
use server::AppState;
use tts_core::StubSynthesizer;

/// Create a test app instance backed by the stub synthesizer, no cache.
pub fn create_test_app() -> Router {
    let opts = SynthesisOptions {
        model: "eleven_turbo_v2_5".to_string(),
        voice_id: "test-voice".to_string(),
        language: "client".to_string(),
        stability: None,
        similarity_boost: None,
        optimize_streaming_latency: None,
        chunk_metadata: HashMap::new(),
    };
    let coordinator = Arc::new(StreamCoordinator::new(
        opts,
        Arc::new(StubSynthesizer::new()),
        None,
    ));
    server::router(AppState { coordinator })
}
