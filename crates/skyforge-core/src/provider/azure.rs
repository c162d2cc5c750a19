use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CloudProvider, ProjectIdentity, node_groups_value};
use crate::config::{AzureConfig, KeyValue, ProviderKind};
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::stage::{INFRASTRUCTURE_STAGE, STATE_STAGE};
use crate::terraform::objects::{self, Backend};
use crate::terraform::{StateImport, VarMap};

const STATE_RESOURCE_GROUP_SUFFIX: &str = "-state";
const NODE_RESOURCE_GROUP_SUFFIX: &str = "-node-resource-group";

#[derive(Debug, Clone)]
pub struct AzureProvider {
    identity: ProjectIdentity,
    settings: AzureConfig,
}

impl AzureProvider {
    pub fn new(identity: ProjectIdentity, settings: AzureConfig) -> Self {
        Self { identity, settings }
    }

    fn resource_group(&self, suffix: &str) -> String {
        match &self.settings.resource_group_name {
            Some(base) => format!("{base}{suffix}"),
            None => format!("{}{suffix}", self.identity.prefix()),
        }
    }

    /// Storage account names allow only lowercase letters and digits.
    fn storage_account(&self) -> String {
        format!(
            "{}{}{}",
            self.identity.project_name,
            self.identity.namespace,
            self.settings.storage_account_postfix
        )
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
    }

    fn storage_container(&self) -> String {
        format!("{}-state", self.identity.prefix())
    }
}

impl CloudProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn input_vars(&self, stage: &str) -> DeployResult<VarMap> {
        match stage {
            STATE_STAGE => {
                let mut vars = self.identity.base_vars();
                vars.extend([
                    ("region".to_string(), json!(self.settings.region)),
                    ("storage_account_name".to_string(), json!(self.storage_account())),
                    (
                        "storage_container_name".to_string(),
                        json!(self.storage_container()),
                    ),
                    (
                        "state_resource_group_name".to_string(),
                        json!(self.resource_group(STATE_RESOURCE_GROUP_SUFFIX)),
                    ),
                    ("tags".to_string(), json!(self.settings.tags)),
                ]);
                Ok(vars)
            }
            INFRASTRUCTURE_STAGE => Ok(VarMap::from_iter([
                ("name".to_string(), json!(self.identity.project_name)),
                ("environment".to_string(), json!(self.identity.namespace)),
                ("region".to_string(), json!(self.settings.region)),
                (
                    "kubernetes_version".to_string(),
                    json!(self.settings.kubernetes_version),
                ),
                (
                    "node_groups".to_string(),
                    node_groups_value(&self.settings.node_groups),
                ),
                ("resource_group_name".to_string(), json!(self.resource_group(""))),
                (
                    "node_resource_group_name".to_string(),
                    json!(self.resource_group(NODE_RESOURCE_GROUP_SUFFIX)),
                ),
                ("tags".to_string(), json!(self.settings.tags)),
            ])),
            _ => Ok(VarMap::new()),
        }
    }

    fn state_backend(&self, directory: &str) -> Option<Backend> {
        Some(
            Backend::new("azurerm")
                .with(
                    "resource_group_name",
                    self.resource_group(STATE_RESOURCE_GROUP_SUFFIX),
                )
                .with("storage_account_name", self.storage_account())
                .with("container_name", self.storage_container())
                .with(
                    "key",
                    format!("terraform/{}/{directory}", self.identity.prefix()),
                ),
        )
    }

    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue> {
        super::pool_label_selectors("azure-node-pool")
    }

    fn state_imports(&self, ctx: &ExecutionContext) -> DeployResult<Vec<StateImport>> {
        let subscription = ctx.var("ARM_SUBSCRIPTION_ID").ok_or_else(|| {
            DeployError::Config(
                "environment variable ARM_SUBSCRIPTION_ID is required for Azure state storage"
                    .to_string(),
            )
        })?;
        let group_url = format!(
            "/subscriptions/{subscription}/resourceGroups/{}",
            self.resource_group(STATE_RESOURCE_GROUP_SUFFIX)
        );
        let account = self.storage_account();
        Ok(vec![
            StateImport::new(
                "module.terraform-state.azurerm_resource_group.terraform-state-resource-group",
                group_url.clone(),
            ),
            StateImport::new(
                "module.terraform-state.azurerm_storage_account.terraform-state-storage-account",
                format!("{group_url}/providers/Microsoft.Storage/storageAccounts/{account}"),
            ),
            StateImport::new(
                "module.terraform-state.azurerm_storage_container.storage_container",
                format!(
                    "https://{account}.blob.core.windows.net/{}",
                    self.storage_container()
                ),
            ),
        ])
    }

    fn cloud_objects(&self) -> Vec<Value> {
        vec![objects::provider("azurerm", json!({"features": {}}))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialScope;

    fn provider(resource_group_name: Option<&str>) -> AzureProvider {
        AzureProvider::new(
            ProjectIdentity {
                project_name: "my-demo".to_string(),
                namespace: "dev".to_string(),
            },
            AzureConfig {
                region: "eastus".to_string(),
                kubernetes_version: "1.29".to_string(),
                storage_account_postfix: "x7k2".to_string(),
                resource_group_name: resource_group_name.map(str::to_string),
                node_groups: BTreeMap::new(),
                tags: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn storage_account_is_lowercase_alphanumeric() {
        assert_eq!(provider(None).storage_account(), "mydemodevx7k2");
    }

    #[test]
    fn resource_group_honours_configured_base() {
        assert_eq!(provider(None).resource_group("-state"), "my-demo-dev-state");
        assert_eq!(provider(Some("team")).resource_group("-state"), "team-state");
    }

    #[test]
    fn imports_require_subscription() {
        let ctx = ExecutionContext::new()
            .scoped(CredentialScope::new("env").with_var("ARM_SUBSCRIPTION_ID", "sub-1"));

        let imports = provider(None).state_imports(&ctx).unwrap();

        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].id, "/subscriptions/sub-1/resourceGroups/my-demo-dev-state");
        assert!(imports[2].id.starts_with("https://mydemodevx7k2.blob.core.windows.net/"));
    }

    #[test]
    fn backend_is_azurerm() {
        let backend = provider(None).state_backend("04-kubernetes-ingress").unwrap();
        assert_eq!(backend.kind, "azurerm");
        assert_eq!(backend.settings["key"], "terraform/my-demo-dev/04-kubernetes-ingress");
    }
}
