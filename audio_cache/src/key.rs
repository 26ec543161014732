use sha2::{Digest, Sha256};

/// Derives a deterministic SHA-256 hex key from every parameter that affects
/// synthesis output.
///
/// Parameters are serialized in a fixed order, one `name=value` line each.
/// Optional parameters contribute a line only when present, so an unset
/// option and an explicit zero produce different keys.
pub fn cache_key(
    text: &str,
    model: &str,
    voice_id: &str,
    language_code: &str,
    stability: Option<f64>,
    similarity_boost: Option<f64>,
    optimize_latency: Option<u8>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "text={text}\nmodel={model}\nvoice={voice_id}\nlang={language_code}\n"
    ));
    if let Some(v) = stability {
        hasher.update(format!("stability={v:.6}\n"));
    }
    if let Some(v) = similarity_boost {
        hasher.update(format!("similarity_boost={v:.6}\n"));
    }
    if let Some(v) = optimize_latency {
        hasher.update(format!("optimize_streaming_latency={v}\n"));
    }
    hex::encode(hasher.finalize())
}
