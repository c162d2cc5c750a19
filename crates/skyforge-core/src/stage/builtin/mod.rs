//! The platform's stage list.

mod infrastructure;
mod ingress;
mod initialize;
mod keycloak;
mod services;
mod state;

use std::path::PathBuf;

use serde_json::{Value, json};

use super::{
    INFRASTRUCTURE_STAGE, KUBERHEALTHY_STAGE, ManifestStage, Stage, StageEnv, StageOutputs,
    TerraformStage,
};
use crate::config::TerraformStateConfig;
use crate::error::DeployResult;
use crate::provider::ProjectIdentity;
use crate::terraform::VarMap;

pub use infrastructure::InfrastructureModule;
pub use ingress::IngressModule;
pub use initialize::KubernetesInitializeModule;
pub use keycloak::{KeycloakConfigurationModule, KeycloakModule, REALM_ID};
pub use services::ServicesModule;
pub use state::TerraformStateModule;

/// Every stage the configuration calls for, in deploy order.
///
/// The state stage only exists when a cloud provider keeps state in the
/// provider-managed remote backend.
pub fn platform_stages(env: &StageEnv) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();
    if env.provider.kind().is_cloud()
        && matches!(env.config.terraform_state, TerraformStateConfig::Remote)
    {
        stages.push(Box::new(TerraformStage::new(TerraformStateModule, env.clone())));
    }
    stages.push(Box::new(TerraformStage::new(InfrastructureModule, env.clone())));
    stages.push(Box::new(TerraformStage::new(
        KubernetesInitializeModule,
        env.clone(),
    )));
    stages.push(Box::new(TerraformStage::new(IngressModule, env.clone())));
    stages.push(Box::new(TerraformStage::new(KeycloakModule, env.clone())));
    stages.push(Box::new(TerraformStage::new(
        KeycloakConfigurationModule,
        env.clone(),
    )));
    stages.push(Box::new(TerraformStage::new(ServicesModule, env.clone())));
    stages.push(Box::new(ManifestStage::new(KUBERHEALTHY_STAGE, env.clone())));
    stages
}

/// Kubeconfig written by the infrastructure stage.
pub fn kubeconfig(outputs: &StageOutputs) -> DeployResult<PathBuf> {
    outputs
        .str_value(INFRASTRUCTURE_STAGE, "kubeconfig_filename")
        .map(PathBuf::from)
}

/// Where the infrastructure stage is asked to write the kubeconfig.
pub fn kubeconfig_target(identity: &ProjectIdentity) -> PathBuf {
    std::env::temp_dir().join(format!("{}-kubeconfig", identity.prefix()))
}

/// `name`, `environment` and `cloud_provider`, shared by in-cluster stages.
fn cluster_vars(env: &StageEnv) -> VarMap {
    VarMap::from_iter([
        ("name".to_string(), json!(env.config.project_name)),
        ("environment".to_string(), json!(env.config.namespace)),
        (
            "cloud_provider".to_string(),
            json!(env.provider.kind().as_str()),
        ),
    ])
}

/// Public endpoint: the configured domain, else the ingress address.
fn endpoint(env: &StageEnv, outputs: &StageOutputs) -> DeployResult<String> {
    match &env.config.domain {
        Some(domain) => Ok(domain.clone()),
        None => ingress::ingress_host(outputs),
    }
}

/// Node group name to `{key, value}` selector.
fn node_groups_var(env: &StageEnv) -> Value {
    json!(env.provider.node_group_selectors())
}
