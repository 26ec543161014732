//! Environment-variable configuration for the adapter.

use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_VOICE_ID: &str = "UgBBYS2sOqTuMpoF3BR0"; // Mark
pub const DEFAULT_MODEL: &str = "eleven_turbo_v2_5";
pub const DEFAULT_LANGUAGE: &str = "client";
pub const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: {0} is required")]
    Missing(&'static str),

    #[error("config: invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("config: {field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

/// Bootstrap configuration for the adapter process.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub port: u16,
    pub api_key: String,
    pub voice_id: String,
    pub model: String,
    /// Language mode: "client", "auto", or a fixed ISO 639-1 code.
    pub language: String,

    // Voice settings (optional). Unset means the upstream default, which is
    // not the same request as an explicit value.
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub optimize_streaming_latency: Option<u8>,

    pub cache_dir: Option<PathBuf>,
    pub cache_max_size_mb: u64,

    pub use_stub_synthesizer: bool,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an injectable lookup so tests can pass
    /// deterministic maps instead of touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cfg = Self {
            port: parse_opt(get("ADAPTER_PORT"), "ADAPTER_PORT")?.unwrap_or(DEFAULT_PORT),
            api_key: get("ELEVENLABS_API_KEY").unwrap_or_default(),
            voice_id: get("VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            model: get("TTS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            language: get("TTS_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            stability: parse_opt(get("TTS_STABILITY"), "TTS_STABILITY")?,
            similarity_boost: parse_opt(get("TTS_SIMILARITY_BOOST"), "TTS_SIMILARITY_BOOST")?,
            optimize_streaming_latency: parse_opt(
                get("TTS_OPTIMIZE_STREAMING_LATENCY"),
                "TTS_OPTIMIZE_STREAMING_LATENCY",
            )?,
            cache_dir: get("CACHE_DIR").map(PathBuf::from),
            cache_max_size_mb: parse_opt(get("CACHE_MAX_SIZE_MB"), "CACHE_MAX_SIZE_MB")?
                .unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB),
            use_stub_synthesizer: get("USE_STUB_SYNTHESIZER")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() && !self.use_stub_synthesizer {
            return Err(ConfigError::Missing("ELEVENLABS_API_KEY"));
        }
        check_range("TTS_STABILITY", self.stability, 0.0, 1.0)?;
        check_range("TTS_SIMILARITY_BOOST", self.similarity_boost, 0.0, 1.0)?;
        if let Some(level) = self.optimize_streaming_latency {
            if level > 4 {
                return Err(ConfigError::OutOfRange {
                    field: "TTS_OPTIMIZE_STREAMING_LATENCY",
                    min: 0.0,
                    max: 4.0,
                    value: level as f64,
                });
            }
        }
        Ok(())
    }

    /// Caching is active only when both a directory and a positive cap are
    /// configured.
    pub fn cache_enabled(&self) -> bool {
        self.cache_dir.is_some() && self.cache_max_size_mb > 0
    }

    pub fn cache_max_bytes(&self) -> u64 {
        self.cache_max_size_mb * 1024 * 1024
    }
}

fn parse_opt<T: std::str::FromStr>(
    value: Option<String>,
    field: &'static str,
) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { field, value: raw }),
    }
}

fn check_range(
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if let Some(v) = value {
        if v < min || v > max {
            return Err(ConfigError::OutOfRange {
                field,
                min,
                max,
                value: v,
            });
        }
    }
    Ok(())
}
