use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use audio_cache::AudioCache;
use server::config::AdapterConfig;
use server::manifest::AdapterManifest;
use server::stream::{StreamCoordinator, SynthesisOptions};
use server::AppState;
use tts_core::{ElevenLabsClient, StubSynthesizer, Synthesizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech synthesis adapter...");

    let config = AdapterConfig::from_env()?;

    let manifest = AdapterManifest::load().unwrap_or_else(|e| {
        warn!("Could not load plugin.yaml: {e}, using built-in identifiers.");
        AdapterManifest::fallback()
    });
    info!(
        "Adapter {} v{} (voice={}, model={}, language={})",
        manifest.slug, manifest.version, config.voice_id, config.model, config.language
    );

    let synthesizer: Arc<dyn Synthesizer> = if config.use_stub_synthesizer {
        warn!("Using stub synthesizer, audio output will be silence");
        Arc::new(StubSynthesizer)
    } else {
        Arc::new(ElevenLabsClient::new(&config.api_key))
    };

    let cache = if config.cache_enabled() {
        // Cache dir is checked by cache_enabled above.
        let dir = config.cache_dir.clone().unwrap_or_default();
        match AudioCache::new(&dir, config.cache_max_bytes()) {
            Ok(cache) => {
                info!(
                    "Audio cache at {} ({} MB, {} entries loaded)",
                    dir.display(),
                    config.cache_max_size_mb,
                    cache.len()
                );
                Some(Arc::new(cache))
            }
            Err(e) => {
                warn!("Could not initialize audio cache: {e}, continuing without cache.");
                None
            }
        }
    } else {
        info!("Audio cache disabled");
        None
    };

    let coordinator = Arc::new(StreamCoordinator::new(
        SynthesisOptions::from_config(&config, &manifest),
        synthesizer,
        cache,
    ));

    let app = server::router(AppState { coordinator });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different ADAPTER_PORT."))?;

    info!("Adapter listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, draining connections");
}
