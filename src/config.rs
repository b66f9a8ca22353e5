//! Gate configuration: defaults, optional TOML file, environment, CLI flags.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::hashing::DEFAULT_CHUNK_SIZE;

/// Model path used when nothing else is configured.
pub const DEFAULT_MODEL_PATH: &str = "model.onnx";
/// Environment variable carrying the expected SHA-256 hex digest.
pub const ENV_EXPECTED_SHA256: &str = "MODEL_GATE_EXPECTED_SHA256";

/// Fully resolved settings for one gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub model_path: PathBuf,
    pub expected_digest_hex: String,
    pub chunk_size_bytes: usize,
    /// Delete the model file when its digest does not match.
    pub remove_on_mismatch: bool,
}

/// One partial source of settings. Later layers win field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub expected_digest_hex: Option<String>,
    #[serde(default)]
    pub chunk_size_bytes: Option<usize>,
    #[serde(default)]
    pub remove_on_mismatch: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no expected digest configured (use --expected, MODEL_GATE_EXPECTED_SHA256, or expected_digest_hex in the config file)")]
    MissingExpectedDigest,
    #[error("chunk_size_bytes must be greater than zero")]
    ZeroChunkSize,
}

impl ConfigLayer {
    /// Overlay `other` on top of `self`.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            model_path: other.model_path.or(self.model_path),
            expected_digest_hex: other.expected_digest_hex.or(self.expected_digest_hex),
            chunk_size_bytes: other.chunk_size_bytes.or(self.chunk_size_bytes),
            remove_on_mismatch: other.remove_on_mismatch.or(self.remove_on_mismatch),
        }
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<ConfigLayer, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Settings taken from the environment via `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> ConfigLayer {
        ConfigLayer {
            expected_digest_hex: lookup(ENV_EXPECTED_SHA256),
            ..ConfigLayer::default()
        }
    }

    /// Fill remaining gaps with defaults and validate.
    pub fn resolve(self) -> Result<GateConfig, ConfigError> {
        let expected_digest_hex = self
            .expected_digest_hex
            .ok_or(ConfigError::MissingExpectedDigest)?;
        let chunk_size_bytes = self.chunk_size_bytes.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size_bytes == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(GateConfig {
            model_path: self
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            expected_digest_hex,
            chunk_size_bytes,
            remove_on_mismatch: self.remove_on_mismatch.unwrap_or(false),
        })
    }
}

/// Build the effective configuration: file, then environment, then `cli`.
pub fn load(
    config_file: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
    cli: ConfigLayer,
) -> Result<GateConfig, ConfigError> {
    let file_layer = match config_file {
        Some(path) => {
            let layer = ConfigLayer::from_file(path)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            layer
        }
        None => ConfigLayer::default(),
    };
    file_layer
        .merge(ConfigLayer::from_env(lookup))
        .merge(cli)
        .resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_fill_everything_but_expected_digest() {
        let layer = ConfigLayer {
            expected_digest_hex: Some(HELLO_SHA256.to_string()),
            ..ConfigLayer::default()
        };
        let cfg = layer.resolve().unwrap();
        assert_eq!(cfg.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(cfg.chunk_size_bytes, DEFAULT_CHUNK_SIZE);
        assert!(!cfg.remove_on_mismatch);
    }

    #[test]
    fn missing_expected_digest_is_an_error() {
        let err = ConfigLayer::default().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::MissingExpectedDigest));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let layer = ConfigLayer {
            expected_digest_hex: Some(HELLO_SHA256.to_string()),
            chunk_size_bytes: Some(0),
            ..ConfigLayer::default()
        };
        assert!(matches!(layer.resolve(), Err(ConfigError::ZeroChunkSize)));
    }

    #[test]
    fn config_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(
            &path,
            format!(
                r#"
                model_path = "models/classifier.onnx"
                expected_digest_hex = "{HELLO_SHA256}"
                chunk_size_bytes = 65536
                remove_on_mismatch = true
                "#
            ),
        )
        .unwrap();
        let cfg = load(Some(&path), no_env, ConfigLayer::default()).unwrap();
        assert_eq!(cfg.model_path, PathBuf::from("models/classifier.onnx"));
        assert_eq!(cfg.expected_digest_hex, HELLO_SHA256);
        assert_eq!(cfg.chunk_size_bytes, 65536);
        assert!(cfg.remove_on_mismatch);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(&path, "expected_hash = \"abc\"\n").unwrap();
        let err = load(Some(&path), no_env, ConfigLayer::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_config_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(
            Some(&dir.path().join("absent.toml")),
            no_env,
            ConfigLayer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(
            &path,
            "expected_digest_hex = \"from-file\"\nmodel_path = \"file.onnx\"\n",
        )
        .unwrap();
        let env = |key: &str| (key == ENV_EXPECTED_SHA256).then(|| "from-env".to_string());

        let cfg = load(Some(&path), env, ConfigLayer::default()).unwrap();
        assert_eq!(cfg.expected_digest_hex, "from-env");
        assert_eq!(cfg.model_path, PathBuf::from("file.onnx"));

        let cli = ConfigLayer {
            expected_digest_hex: Some("from-cli".to_string()),
            model_path: Some(PathBuf::from("cli.onnx")),
            ..ConfigLayer::default()
        };
        let cfg = load(Some(&path), env, cli).unwrap();
        assert_eq!(cfg.expected_digest_hex, "from-cli");
        assert_eq!(cfg.model_path, PathBuf::from("cli.onnx"));
    }

    #[test]
    fn expected_digest_is_kept_verbatim() {
        let cli = ConfigLayer {
            expected_digest_hex: Some(format!(" {}", HELLO_SHA256.to_uppercase())),
            ..ConfigLayer::default()
        };
        let cfg = load(None, no_env, cli).unwrap();
        assert_eq!(cfg.expected_digest_hex, format!(" {}", HELLO_SHA256.to_uppercase()));
    }
}
