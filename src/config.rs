//! Batch Configuration
//!
//! Loaded from JSON. Every field has a default, so `{}` is a valid file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::color::CANONICAL_PROFILE;
use crate::export::{Codec, CodecFailurePolicy};
use crate::naming::{is_illegal, CollisionPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Substitute character {0:?} is itself illegal in file names")]
    IllegalSubstitute(char),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    /// WebP only, run on the session document.
    #[serde(rename = "webp")]
    WebP,
    /// WebP and JPEG, run on a sanitized scratch duplicate.
    #[default]
    #[serde(rename = "webpJpeg")]
    WebPJpeg,
}

impl Variant {
    pub fn codecs(self) -> &'static [Codec] {
        match self {
            Variant::WebP => &[Codec::WebP],
            Variant::WebPJpeg => &[Codec::WebP, Codec::Jpeg],
        }
    }

    /// Whether units are sanitized and color-normalized, the master is a
    /// scratch duplicate and a prefix is prompted for.
    pub fn is_rich(self) -> bool {
        self == Variant::WebPJpeg
    }

    pub fn default_substitute(self) -> char {
        match self {
            Variant::WebP => '-',
            Variant::WebPJpeg => '_',
        }
    }
}

fn default_separator() -> String {
    " - ".to_string()
}

fn default_prefix_separator() -> String {
    "_".to_string()
}

fn default_profile() -> String {
    CANONICAL_PROFILE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    #[serde(default)]
    pub variant: Variant,
    /// Overrides the variant's substitute character
    #[serde(default)]
    pub substitute: Option<char>,
    /// Between document base name and artboard name when no prefix is used
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Appended to the document base name in the suggested prefix
    #[serde(default = "default_prefix_separator")]
    pub prefix_separator: String,
    #[serde(default)]
    pub collision: CollisionPolicy,
    #[serde(default)]
    pub codec_failure: CodecFailurePolicy,
    #[serde(default = "default_profile")]
    pub canonical_profile: String,
}

impl BatchConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let substitute = self.substitute();
        if is_illegal(substitute) {
            return Err(ConfigError::IllegalSubstitute(substitute));
        }
        Ok(())
    }

    pub fn substitute(&self) -> char {
        self.substitute.unwrap_or_else(|| self.variant.default_substitute())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            substitute: None,
            separator: default_separator(),
            prefix_separator: default_prefix_separator(),
            collision: CollisionPolicy::default(),
            codec_failure: CodecFailurePolicy::default(),
            canonical_profile: default_profile(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BatchConfig::from_json("{}").unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.variant, Variant::WebPJpeg);
        assert_eq!(config.substitute(), '_');
    }

    #[test]
    fn test_variant_substitutes() {
        assert_eq!(BatchConfig::for_variant(Variant::WebP).substitute(), '-');
        let config = BatchConfig::from_json(r#"{"variant": "webp", "substitute": "~"}"#).unwrap();
        assert_eq!(config.substitute(), '~');
        assert_eq!(config.variant.codecs(), &[Codec::WebP]);
    }

    #[test]
    fn test_policies_parse() {
        let config = BatchConfig::from_json(
            r#"{"collision": "suffix", "codecFailure": "abortArtboard"}"#,
        )
        .unwrap();
        assert_eq!(config.collision, CollisionPolicy::Suffix);
        assert_eq!(config.codec_failure, CodecFailurePolicy::AbortArtboard);
    }

    #[test]
    fn test_separators_are_independent() {
        let config = BatchConfig::default();
        assert_eq!((config.separator.as_str(), config.prefix_separator.as_str()), (" - ", "_"));

        let config = BatchConfig::from_json(r#"{"prefixSeparator": "-"}"#).unwrap();
        assert_eq!(config.prefix_separator, "-");
        assert_eq!(config.separator, " - ");
    }

    #[test]
    fn test_illegal_substitute_rejected() {
        let err = BatchConfig::from_json(r#"{"substitute": "."}"#).unwrap_err();
        assert!(matches!(err, ConfigError::IllegalSubstitute('.')));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(&path, r#"{"variant": "webp"}"#).unwrap();
        assert_eq!(BatchConfig::load(&path).unwrap().variant, Variant::WebP);
    }
}
