//! Tool settings from `settings.toml`.
//!
//! These describe the machine running skyforge (binaries, check timing,
//! template location), not the deployment itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const SETTINGS_FILENAME: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Infrastructure-as-code binary, name or path.
    pub terraform_binary: String,
    pub kubectl_binary: String,
    /// Root holding `<stage-name>[/<provider>]/` template trees.
    pub template_root: Option<PathBuf>,
    /// Seconds before a single state import is killed.
    pub import_timeout_secs: u64,
    /// Seconds kubectl waits on a single API request.
    pub kubectl_timeout_secs: u64,
    /// Skip TLS verification when probing freshly deployed endpoints.
    pub accept_invalid_certs: bool,
    pub checks: CheckSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub attempts: u32,
    pub interval_secs: u64,
    /// Rounds for checks that back off exponentially (DNS, realm propagation).
    pub slow_attempts: u32,
    pub slow_base_secs: u64,
    pub slow_max_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            terraform_binary: "terraform".to_string(),
            kubectl_binary: "kubectl".to_string(),
            template_root: None,
            import_timeout_secs: 30,
            kubectl_timeout_secs: 30,
            accept_invalid_certs: true,
            checks: CheckSettings::default(),
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_secs: 10,
            slow_attempts: 5,
            slow_base_secs: 60,
            slow_max_secs: 960,
        }
    }
}

impl CheckSettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.attempts, Duration::from_secs(self.interval_secs))
    }

    pub fn slow_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.slow_attempts,
            Duration::from_secs(self.slow_base_secs),
            Duration::from_secs(self.slow_max_secs),
        )
    }

    /// Policy with no delays, for tests and dry environments.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            interval_secs: 0,
            slow_attempts: attempts,
            slow_base_secs: 0,
            slow_max_secs: 0,
        }
    }
}

impl Settings {
    /// `<config dir>/skyforge/settings.toml`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("skyforge")
            .join(SETTINGS_FILENAME))
    }

    /// Load settings; a missing file yields defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    pub fn kubectl_timeout(&self) -> Duration {
        Duration::from_secs(self.kubectl_timeout_secs)
    }
}
