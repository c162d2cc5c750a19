//! Outputs accumulated across a pipeline run.
//!
//! Each stage writes only under its own key; later stages read earlier keys.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeployError, DeployResult};

/// One output value as reported by `terraform output -json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

impl OutputValue {
    pub fn plain(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            sensitive: false,
        }
    }

    pub fn sensitive(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            sensitive: true,
        }
    }
}

pub type OutputMap = BTreeMap<String, OutputValue>;

/// Stage name to that stage's outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    stages: BTreeMap<String, OutputMap>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `outputs` into the entry for `stage`. Entries of other stages are
    /// never touched.
    pub fn record(&mut self, stage: &str, outputs: OutputMap) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .extend(outputs);
    }

    pub fn stage(&self, stage: &str) -> Option<&OutputMap> {
        self.stages.get(stage)
    }

    pub fn contains_stage(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn value(&self, stage: &str, key: &str) -> DeployResult<&Value> {
        self.stages
            .get(stage)
            .and_then(|outputs| outputs.get(key))
            .map(|output| &output.value)
            .ok_or_else(|| DeployError::missing_output(stage, key))
    }

    pub fn str_value(&self, stage: &str, key: &str) -> DeployResult<&str> {
        self.value(stage, key)?
            .as_str()
            .ok_or_else(|| DeployError::missing_output(stage, format!("{key} (as string)")))
    }

    pub fn object_value(
        &self,
        stage: &str,
        key: &str,
    ) -> DeployResult<&serde_json::Map<String, Value>> {
        self.value(stage, key)?
            .as_object()
            .ok_or_else(|| DeployError::missing_output(stage, format!("{key} (as object)")))
    }

    /// Copy with sensitive values replaced, for display.
    pub fn redacted(&self) -> Self {
        let stages = self
            .stages
            .iter()
            .map(|(stage, outputs)| {
                let outputs = outputs
                    .iter()
                    .map(|(key, output)| {
                        let value = if output.sensitive {
                            OutputValue::sensitive("<sensitive>")
                        } else {
                            output.clone()
                        };
                        (key.clone(), value)
                    })
                    .collect();
                (stage.clone(), outputs)
            })
            .collect();
        Self { stages }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize outputs")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write outputs: {}", path.display()))
    }

    /// Load saved outputs; a missing file yields an empty set.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outputs: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse outputs: {}", path.display()))
    }
}
