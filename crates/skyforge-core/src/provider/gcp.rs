use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CloudProvider, ProjectIdentity, pool_label_selectors};
use crate::config::{GcpConfig, KeyValue, ProviderKind};
use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::stage::{INFRASTRUCTURE_STAGE, STATE_STAGE};
use crate::terraform::objects::{self, Backend};
use crate::terraform::{StateImport, VarMap};

#[derive(Debug, Clone)]
pub struct GcpProvider {
    identity: ProjectIdentity,
    settings: GcpConfig,
}

impl GcpProvider {
    pub fn new(identity: ProjectIdentity, settings: GcpConfig) -> Self {
        Self { identity, settings }
    }
}

impl CloudProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn input_vars(&self, stage: &str) -> DeployResult<VarMap> {
        match stage {
            STATE_STAGE => {
                let mut vars = self.identity.base_vars();
                vars.insert("region".to_string(), json!(self.settings.region));
                Ok(vars)
            }
            INFRASTRUCTURE_STAGE => {
                let node_groups: Vec<Value> = self
                    .settings
                    .node_groups
                    .iter()
                    .map(|(name, group)| {
                        json!({
                            "name": name,
                            "instance_type": group.instance,
                            "min_size": group.min_nodes,
                            "max_size": group.max_nodes,
                        })
                    })
                    .collect();
                Ok(VarMap::from_iter([
                    ("name".to_string(), json!(self.identity.project_name)),
                    ("environment".to_string(), json!(self.identity.namespace)),
                    ("region".to_string(), json!(self.settings.region)),
                    ("project_id".to_string(), json!(self.settings.project)),
                    (
                        "availability_zones".to_string(),
                        json!(self.settings.availability_zones),
                    ),
                    (
                        "kubernetes_version".to_string(),
                        json!(self.settings.kubernetes_version),
                    ),
                    ("node_groups".to_string(), Value::Array(node_groups)),
                ]))
            }
            _ => Ok(VarMap::new()),
        }
    }

    fn state_backend(&self, directory: &str) -> Option<Backend> {
        Some(
            Backend::new("gcs")
                .with("bucket", self.identity.state_bucket())
                .with(
                    "prefix",
                    format!("terraform/{}/{directory}", self.identity.project_name),
                ),
        )
    }

    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue> {
        pool_label_selectors("cloud.google.com/gke-nodepool")
    }

    fn state_imports(&self, _ctx: &ExecutionContext) -> DeployResult<Vec<StateImport>> {
        Ok(vec![StateImport::new(
            "module.terraform-state.module.gcs.google_storage_bucket.static-site",
            self.identity.state_bucket(),
        )])
    }

    fn cloud_objects(&self) -> Vec<Value> {
        vec![objects::provider(
            "google",
            json!({"project": self.settings.project, "region": self.settings.region}),
        )]
    }
}
