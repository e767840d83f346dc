//! Global configuration model for the krate session manager.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{KrateError, Result};

/// Root configuration shared by the login hook and the operator CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrateConfig {
    /// Directory holding zone manifests.
    pub manifest_dir: PathBuf,
    /// Directory holding session registry files.
    pub registry_dir: PathBuf,
    /// Name of the named semaphore used as the session lock.
    pub semaphore_name: String,
    /// Shell launched by `krate --attach` without a command.
    pub default_shell: PathBuf,
}

impl Default for KrateConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from(constants::DEFAULT_MANIFEST_DIR),
            registry_dir: PathBuf::from(constants::DEFAULT_REGISTRY_DIR),
            semaphore_name: constants::DEFAULT_SEMAPHORE_NAME.to_string(),
            default_shell: PathBuf::from(constants::DEFAULT_SHELL),
        }
    }
}

impl KrateConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// Fields absent from the file keep their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KrateError::Resource {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| KrateError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        // sem_open(3) names are a single leading slash followed by a plain name.
        let name = self.semaphore_name.strip_prefix('/').unwrap_or_default();
        if name.is_empty() || name.contains('/') {
            return Err(KrateError::Config {
                message: format!("invalid semaphore name: {:?}", self.semaphore_name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("krate.json");
        std::fs::write(&path, r#"{ "registry_dir": "/tmp/reg" }"#).expect("write");

        let config = KrateConfig::load(&path).expect("load");
        assert_eq!(config.registry_dir, PathBuf::from("/tmp/reg"));
        assert_eq!(config.manifest_dir, PathBuf::from(constants::DEFAULT_MANIFEST_DIR));
        assert_eq!(config.semaphore_name, constants::DEFAULT_SEMAPHORE_NAME);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = KrateConfig::load_or_default(&dir.path().join("absent.json")).expect("load");
        assert_eq!(config, KrateConfig::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("krate.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            KrateConfig::load(&path),
            Err(KrateError::Config { .. })
        ));
    }

    #[test]
    fn semaphore_name_must_be_slash_prefixed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("krate.json");
        std::fs::write(&path, r#"{ "semaphore_name": "no-slash" }"#).expect("write");
        assert!(KrateConfig::load(&path).is_err());
    }
}
