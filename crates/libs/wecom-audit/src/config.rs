use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

pub const DEFAULT_BATCH_LIMIT: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Engine configuration as loaded from a JSON file. Unknown keys are
/// ignored so host-side settings can share the same file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub private_key_path: PathBuf,
    #[serde(default)]
    pub publickey_ver: Option<u32>,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_limit() -> u64 {
    DEFAULT_BATCH_LIMIT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl EngineConfig {
    /// Loads the config, resolving a relative `private_key_path` against the
    /// directory the config file lives in.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("read {}: {err}", path.display())))?;
        let mut config: EngineConfig = serde_json::from_str(&raw)
            .map_err(|err| EngineError::Config(format!("parse {}: {err}", path.display())))?;

        if config.private_key_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.private_key_path = dir.join(&config.private_key_path);
            }
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn relative_key_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&config_path).expect("create config");
        write!(file, r#"{{"private_key_path": "key/private.pem"}}"#).expect("write config");

        let config = EngineConfig::load(&config_path).expect("load config");
        assert_eq!(config.private_key_path, dir.path().join("key/private.pem"));
        assert_eq!(config.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.publickey_ver, None);
    }

    #[test]
    fn absolute_key_path_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"private_key_path": "/etc/audit/private.pem", "batch_limit": 50, "timeout_secs": 5, "publickey_ver": 3}"#,
        )
        .expect("write config");

        let config = EngineConfig::load(&config_path).expect("load config");
        assert_eq!(config.private_key_path, PathBuf::from("/etc/audit/private.pem"));
        assert_eq!(config.batch_limit, 50);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.publickey_ver, Some(3));
    }

    #[test]
    fn missing_or_invalid_config_is_a_config_error() {
        let missing = EngineConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(missing, EngineError::Config(_)));

        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "not json").expect("write config");
        let invalid = EngineConfig::load(&config_path).unwrap_err();
        assert!(matches!(invalid, EngineError::Config(_)));
    }
}
