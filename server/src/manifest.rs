//! Adapter manifest loading.
//!
//! Static identifiers for this adapter live in `plugin.yaml` next to the
//! binary. Centralising them makes it easy to clone this repository for new
//! adapters.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest: plugin.yaml not found next to binary or source tree")]
    NotFound,

    #[error("manifest: decode plugin.yaml: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("manifest: metadata.{0} missing in plugin.yaml")]
    MissingField(&'static str),
}

/// Static identifiers for the adapter.
#[derive(Debug, Clone)]
pub struct AdapterManifest {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub version: String,
    pub generator: String,
}

#[derive(Deserialize, Default)]
struct ManifestDocument {
    #[serde(default)]
    metadata: ManifestMetadata,
}

#[derive(Deserialize, Default)]
struct ManifestMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    generator: String,
}

impl AdapterManifest {
    /// Loads `plugin.yaml` from the binary's directory, the working
    /// directory, or the workspace root.
    pub fn load() -> Result<Self, ManifestError> {
        for base in candidate_dirs() {
            let candidate = base.join("plugin.yaml");
            if let Ok(data) = fs::read_to_string(&candidate) {
                return Self::parse(&data);
            }
        }
        Err(ManifestError::NotFound)
    }

    /// Parses manifest YAML, applying slug-derived fallbacks for optional
    /// fields. `version` and `slug` are required.
    pub fn parse(data: &str) -> Result<Self, ManifestError> {
        let doc: ManifestDocument = serde_yaml::from_str(data)?;
        let meta = doc.metadata;

        let version = non_blank(&meta.version).ok_or(ManifestError::MissingField("version"))?;
        let slug = non_blank(&meta.slug).ok_or(ManifestError::MissingField("slug"))?;
        let name = non_blank(&meta.name).unwrap_or_else(|| slug.clone());
        let description = non_blank(&meta.description).unwrap_or_else(|| name.clone());
        let generator = non_blank(&meta.generator).unwrap_or_else(|| slug.clone());

        Ok(Self {
            name,
            slug,
            description,
            version,
            generator,
        })
    }

    /// Built-in identifiers used when no manifest file is present.
    pub fn fallback() -> Self {
        let slug = env!("CARGO_PKG_NAME").to_string();
        Self {
            name: slug.clone(),
            description: slug.clone(),
            generator: slug.clone(),
            slug,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The standard metadata payload attached to emitted audio chunks.
    pub fn synthesis_metadata(&self, model: &str, voice_id: &str) -> HashMap<String, String> {
        HashMap::from([
            ("generator".to_string(), self.generator.clone()),
            ("model".to_string(), model.to_string()),
            ("voice_id".to_string(), voice_id.to_string()),
        ])
    }
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = env::current_exe() {
        if let Some(parent) = exe.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    if let Ok(cwd) = env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(workspace) = PathBuf::from(env!("CARGO_MANIFEST_DIR")).parent() {
        dirs.push(workspace.to_path_buf());
    }
    dirs.dedup();
    dirs
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\
metadata:
  name: ElevenLabs Streaming TTS
  slug: tts-remote-elevenlabs
  description: Streams ElevenLabs synthesis with disk-backed caching
  version: 0.1.0
  generator: tts-remote-elevenlabs
";

    #[test]
    fn parses_complete_manifest() {
        let manifest = AdapterManifest::parse(FULL).unwrap();
        assert_eq!(manifest.name, "ElevenLabs Streaming TTS");
        assert_eq!(manifest.slug, "tts-remote-elevenlabs");
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.generator, "tts-remote-elevenlabs");
    }

    #[test]
    fn optional_fields_fall_back_to_slug() {
        let manifest = AdapterManifest::parse(
            "metadata:\n  slug: my-adapter\n  version: 1.2.3\n",
        )
        .unwrap();
        assert_eq!(manifest.name, "my-adapter");
        assert_eq!(manifest.description, "my-adapter");
        assert_eq!(manifest.generator, "my-adapter");
    }

    #[test]
    fn missing_version_is_an_error() {
        let err = AdapterManifest::parse("metadata:\n  slug: my-adapter\n").unwrap_err();
        assert!(matches!(err, ManifestError::MissingField("version")));
    }

    #[test]
    fn missing_slug_is_an_error() {
        let err = AdapterManifest::parse("metadata:\n  version: 1.0.0\n").unwrap_err();
        assert!(matches!(err, ManifestError::MissingField("slug")));
    }

    #[test]
    fn synthesis_metadata_payload() {
        let manifest = AdapterManifest::parse(FULL).unwrap();
        let meta = manifest.synthesis_metadata("eleven_turbo_v2_5", "voice-1");
        assert_eq!(meta.get("generator").map(String::as_str), Some("tts-remote-elevenlabs"));
        assert_eq!(meta.get("model").map(String::as_str), Some("eleven_turbo_v2_5"));
        assert_eq!(meta.get("voice_id").map(String::as_str), Some("voice-1"));
    }
}
