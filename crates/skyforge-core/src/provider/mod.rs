//! Per-provider behavior behind one trait.
//!
//! Every place that would otherwise branch on the provider name asks the
//! [`CloudProvider`] built from the configuration instead.

pub mod aws;
pub mod azure;
pub mod digital_ocean;
pub mod gcp;
pub mod local;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::{KeyValue, ProviderConfig, ProviderKind, SkyforgeConfig, TerraformStateConfig};
use crate::credentials::{CredentialScope, ExecutionContext};
use crate::error::DeployResult;
use crate::terraform::objects::{self, Backend};
use crate::terraform::{StateImport, VarMap};

pub use aws::AwsProvider;
pub use azure::AzureProvider;
pub use digital_ocean::DigitalOceanProvider;
pub use gcp::GcpProvider;
pub use local::LocalProvider;

/// Node groups every platform schedules onto.
pub const NODE_GROUPS: [&str; 3] = ["general", "user", "worker"];

/// Project name and namespace shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub project_name: String,
    pub namespace: String,
}

impl ProjectIdentity {
    pub fn from_config(config: &SkyforgeConfig) -> Self {
        Self {
            project_name: config.project_name.clone(),
            namespace: config.namespace.clone(),
        }
    }

    /// `<project>-<namespace>`
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.project_name, self.namespace)
    }

    pub fn state_bucket(&self) -> String {
        format!("{}-terraform-state", self.prefix())
    }

    pub fn base_vars(&self) -> VarMap {
        VarMap::from_iter([
            ("name".to_string(), json!(self.project_name)),
            ("namespace".to_string(), json!(self.namespace)),
        ])
    }
}

pub trait CloudProvider: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider-specific variables for `stage`; empty for stages that have none.
    fn input_vars(&self, stage: &str) -> DeployResult<VarMap>;

    /// Remote state backend for the stage stored under `directory`.
    fn state_backend(&self, directory: &str) -> Option<Backend>;

    /// Node group name to the label selecting its nodes.
    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue>;

    /// Resources the state stage adopts when they already exist.
    fn state_imports(&self, _ctx: &ExecutionContext) -> DeployResult<Vec<StateImport>> {
        Ok(Vec::new())
    }

    /// Variables the state backend needs, exposed to every stage from the
    /// state stage onwards.
    fn state_credentials(&self, _ctx: &ExecutionContext) -> DeployResult<Option<CredentialScope>> {
        Ok(None)
    }

    /// Cloud provider blocks for the state and infrastructure stages.
    fn cloud_objects(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Kubernetes and Helm provider blocks for in-cluster stages.
    fn kubernetes_objects(&self) -> Vec<Value> {
        vec![
            objects::provider("kubernetes", json!({"experiments": {"manifest_resource": true}})),
            objects::provider("helm", json!({})),
        ]
    }
}

/// Build the provider selected by `config`.
pub fn for_config(config: &SkyforgeConfig) -> Arc<dyn CloudProvider> {
    let identity = ProjectIdentity::from_config(config);
    match &config.provider {
        ProviderConfig::Local { local } => Arc::new(LocalProvider::new(identity, local.clone())),
        ProviderConfig::DigitalOcean { digital_ocean } => {
            Arc::new(DigitalOceanProvider::new(identity, digital_ocean.clone()))
        }
        ProviderConfig::Gcp {
            google_cloud_platform,
        } => Arc::new(GcpProvider::new(identity, google_cloud_platform.clone())),
        ProviderConfig::Azure { azure } => Arc::new(AzureProvider::new(identity, azure.clone())),
        ProviderConfig::Aws {
            amazon_web_services,
        } => Arc::new(AwsProvider::new(identity, amazon_web_services.clone())),
    }
}

/// Backend block for `directory` given the configured state type.
pub fn state_backend_for(
    config: &SkyforgeConfig,
    provider: &dyn CloudProvider,
    directory: &str,
) -> Option<Backend> {
    match &config.terraform_state {
        TerraformStateConfig::Local => None,
        TerraformStateConfig::Existing { backend, config } => Some(Backend {
            kind: backend.clone(),
            settings: config.clone().into_iter().collect(),
        }),
        TerraformStateConfig::Remote => provider.state_backend(directory),
    }
}

/// Selectors keyed by the cloud label that names a node pool.
pub(crate) fn pool_label_selectors(label: &str) -> BTreeMap<String, KeyValue> {
    NODE_GROUPS
        .iter()
        .map(|group| {
            (
                (*group).to_string(),
                KeyValue {
                    key: label.to_string(),
                    value: (*group).to_string(),
                },
            )
        })
        .collect()
}

/// `{"instance", "min_nodes", "max_nodes"}` per node group.
pub(crate) fn node_groups_value(
    groups: &BTreeMap<String, crate::config::NodeGroup>,
) -> Value {
    let map: serde_json::Map<String, Value> = groups
        .iter()
        .map(|(name, group)| {
            (
                name.clone(),
                json!({
                    "instance": group.instance,
                    "min_nodes": group.min_nodes,
                    "max_nodes": group.max_nodes,
                }),
            )
        })
        .collect();
    Value::Object(map)
}
