use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CloudProvider, ProjectIdentity, node_groups_value, pool_label_selectors};
use crate::config::{DigitalOceanConfig, KeyValue, ProviderKind};
use crate::credentials::{CredentialScope, ExecutionContext};
use crate::error::{DeployError, DeployResult};
use crate::stage::{INFRASTRUCTURE_STAGE, STATE_STAGE};
use crate::terraform::objects::{self, Backend};
use crate::terraform::{StateImport, VarMap};

/// Spaces keys and the S3-compatible names the state backend reads them as.
const SPACES_AS_S3: &[(&str, &str)] = &[
    ("SPACES_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"),
    ("SPACES_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"),
];

#[derive(Debug, Clone)]
pub struct DigitalOceanProvider {
    identity: ProjectIdentity,
    settings: DigitalOceanConfig,
}

impl DigitalOceanProvider {
    pub fn new(identity: ProjectIdentity, settings: DigitalOceanConfig) -> Self {
        Self { identity, settings }
    }
}

impl CloudProvider for DigitalOceanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    fn input_vars(&self, stage: &str) -> DeployResult<VarMap> {
        match stage {
            STATE_STAGE => {
                let mut vars = self.identity.base_vars();
                vars.insert("region".to_string(), json!(self.settings.region));
                Ok(vars)
            }
            INFRASTRUCTURE_STAGE => Ok(VarMap::from_iter([
                ("name".to_string(), json!(self.identity.project_name)),
                ("environment".to_string(), json!(self.identity.namespace)),
                ("region".to_string(), json!(self.settings.region)),
                ("tags".to_string(), json!(self.settings.tags)),
                (
                    "kubernetes_version".to_string(),
                    json!(self.settings.kubernetes_version),
                ),
                (
                    "node_groups".to_string(),
                    node_groups_value(&self.settings.node_groups),
                ),
            ])),
            _ => Ok(VarMap::new()),
        }
    }

    fn state_backend(&self, directory: &str) -> Option<Backend> {
        let prefix = self.identity.prefix();
        Some(
            Backend::new("s3")
                .with(
                    "endpoint",
                    format!("{}.digitaloceanspaces.com", self.settings.region),
                )
                // Any valid AWS region; Spaces ignores it.
                .with("region", "us-west-1")
                .with("bucket", self.identity.state_bucket())
                .with("key", format!("terraform/{prefix}/{directory}.tfstate"))
                .with("skip_credentials_validation", true)
                .with("skip_metadata_api_check", true),
        )
    }

    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue> {
        pool_label_selectors("doks.digitalocean.com/node-pool")
    }

    fn state_imports(&self, _ctx: &ExecutionContext) -> DeployResult<Vec<StateImport>> {
        Ok(vec![StateImport::new(
            "module.terraform-state.module.spaces.digitalocean_spaces_bucket.main",
            format!("{},{}", self.settings.region, self.identity.state_bucket()),
        )])
    }

    fn state_credentials(&self, ctx: &ExecutionContext) -> DeployResult<Option<CredentialScope>> {
        let mut scope = CredentialScope::new("spaces");
        for (source, target) in SPACES_AS_S3 {
            let value = ctx.var(source).ok_or_else(|| {
                DeployError::Config(format!(
                    "environment variable {source} is required for DigitalOcean state storage"
                ))
            })?;
            scope = scope.with_var(*target, value);
        }
        Ok(Some(scope))
    }

    fn cloud_objects(&self) -> Vec<Value> {
        vec![objects::provider("digitalocean", json!({}))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DigitalOceanProvider {
        DigitalOceanProvider::new(
            ProjectIdentity {
                project_name: "demo".to_string(),
                namespace: "dev".to_string(),
            },
            DigitalOceanConfig {
                region: "nyc3".to_string(),
                kubernetes_version: "1.29.1-do.0".to_string(),
                node_groups: BTreeMap::new(),
                tags: vec![],
            },
        )
    }

    #[test]
    fn import_id_is_region_and_bucket() {
        let imports = provider().state_imports(&ExecutionContext::new()).unwrap();
        assert_eq!(imports[0].id, "nyc3,demo-dev-terraform-state");
    }

    #[test]
    fn backend_points_at_spaces_endpoint() {
        let backend = provider().state_backend("02-infrastructure").unwrap();
        assert_eq!(backend.settings["endpoint"], "nyc3.digitaloceanspaces.com");
        assert_eq!(backend.settings["skip_credentials_validation"], true);
    }

    #[test]
    fn spaces_keys_become_s3_keys() {
        let ctx = ExecutionContext::new().scoped(
            CredentialScope::new("env")
                .with_var("SPACES_ACCESS_KEY_ID", "key")
                .with_var("SPACES_SECRET_ACCESS_KEY", "secret"),
        );

        let scope = provider().state_credentials(&ctx).unwrap().unwrap();

        assert_eq!(scope.vars()["AWS_ACCESS_KEY_ID"], "key");
        assert_eq!(scope.vars()["AWS_SECRET_ACCESS_KEY"], "secret");
    }
}
