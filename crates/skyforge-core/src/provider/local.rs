use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CloudProvider, ProjectIdentity};
use crate::config::{KeyValue, LocalConfig, ProviderKind};
use crate::error::DeployResult;
use crate::stage::INFRASTRUCTURE_STAGE;
use crate::terraform::objects::{self, Backend};
use crate::terraform::VarMap;

/// An existing cluster reachable through the local kubeconfig.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    identity: ProjectIdentity,
    settings: LocalConfig,
}

impl LocalProvider {
    pub fn new(identity: ProjectIdentity, settings: LocalConfig) -> Self {
        Self { identity, settings }
    }
}

impl CloudProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn input_vars(&self, stage: &str) -> DeployResult<VarMap> {
        match stage {
            INFRASTRUCTURE_STAGE => Ok(VarMap::from_iter([(
                "kube_context".to_string(),
                json!(self.settings.kube_context),
            )])),
            _ => Ok(VarMap::new()),
        }
    }

    /// State lives in cluster secrets.
    fn state_backend(&self, directory: &str) -> Option<Backend> {
        let mut backend = Backend::new("kubernetes")
            .with(
                "secret_suffix",
                format!("{}-{directory}", self.identity.prefix()),
            )
            .with("load_config_file", true);
        if let Some(context) = &self.settings.kube_context {
            backend = backend.with("config_context", context.clone());
        }
        Some(backend)
    }

    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue> {
        self.settings.node_selectors.clone()
    }

    fn kubernetes_objects(&self) -> Vec<Value> {
        let mut kubernetes = json!({"experiments": {"manifest_resource": true}});
        let mut helm = json!({});
        if let Some(context) = &self.settings.kube_context {
            kubernetes["config_context"] = json!(context);
            helm = json!({"kubernetes": {"config_context": context}});
        }
        vec![
            objects::provider("kubernetes", kubernetes),
            objects::provider("helm", helm),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(kube_context: Option<&str>) -> LocalProvider {
        LocalProvider::new(
            ProjectIdentity {
                project_name: "demo".to_string(),
                namespace: "dev".to_string(),
            },
            LocalConfig {
                kube_context: kube_context.map(str::to_string),
                ..LocalConfig::default()
            },
        )
    }

    #[test]
    fn backend_stores_state_in_cluster_secret() {
        let backend = provider(Some("kind-demo"))
            .state_backend("03-kubernetes-initialize")
            .unwrap();
        assert_eq!(backend.kind, "kubernetes");
        assert_eq!(
            backend.settings["secret_suffix"],
            "demo-dev-03-kubernetes-initialize"
        );
        assert_eq!(backend.settings["config_context"], "kind-demo");
    }

    #[test]
    fn no_context_means_no_context_setting() {
        let backend = provider(None).state_backend("x").unwrap();
        assert!(!backend.settings.contains_key("config_context"));
    }

    #[test]
    fn default_selectors_cover_all_groups() {
        let selectors = provider(None).node_group_selectors();
        assert_eq!(selectors.len(), 3);
        assert_eq!(selectors["worker"].key, "kubernetes.io/os");
    }
}
