//! Config store for loading and saving skyforge-config.yaml.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_yaml::Value;

use super::{SkyforgeConfig, parser};
use crate::error::{DeployError, DeployResult};

pub const CONFIG_FILENAME: &str = "skyforge-config.yaml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Store for the default file name in the current directory.
    pub fn in_current_dir() -> anyhow::Result<Self> {
        Ok(Self::new(std::env::current_dir()?.join(CONFIG_FILENAME)))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Typed, validated configuration.
    pub fn load(&self) -> DeployResult<SkyforgeConfig> {
        if !self.config_path.exists() {
            return Err(DeployError::Config(format!(
                "configuration file {} does not exist",
                self.config_path.display()
            )));
        }
        parser::parse_config(&self.config_path)
    }

    /// Raw document, unknown keys included and placeholders unresolved.
    pub fn load_document(&self) -> DeployResult<Value> {
        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| DeployError::io(&self.config_path, e))?;
        parser::parse_document(&content)
    }

    pub fn save_document(&self, document: &Value) -> anyhow::Result<()> {
        let content = parser::to_yaml(document).context("Failed to serialize config to YAML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }

    /// Path of the backup copy for `suffix`: `<file name>.<suffix>.backup`.
    pub fn backup_path(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .config_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| CONFIG_FILENAME.to_string());
        self.config_path
            .with_file_name(format!("{file_name}.{suffix}.backup"))
    }

    /// Copy the current file aside before it is overwritten.
    pub fn backup(&self, suffix: &str) -> anyhow::Result<PathBuf> {
        let target = self.backup_path(suffix);
        std::fs::copy(&self.config_path, &target).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                self.config_path.display(),
                target.display()
            )
        })?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join(CONFIG_FILENAME));
        assert!(matches!(store.load(), Err(DeployError::Config(_))));
    }

    #[test]
    fn test_document_round_trip_keeps_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "project_name: demo\nprovider: local\ncustom: 1\n").unwrap();
        let store = ConfigStore::new(&path);

        let document = store.load_document().unwrap();
        store.save_document(&document).unwrap();
        let again = store.load_document().unwrap();

        assert_eq!(document, again);
        assert_eq!(again["custom"], Value::from(1));
    }

    #[test]
    fn test_backup_uses_suffix() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "project_name: demo\n").unwrap();
        let store = ConfigStore::new(&path);

        let backup = store.backup("2024.4.1").unwrap();

        assert_eq!(
            backup.file_name().unwrap().to_string_lossy(),
            "skyforge-config.yaml.2024.4.1.backup"
        );
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "project_name: demo\n");
    }
}
