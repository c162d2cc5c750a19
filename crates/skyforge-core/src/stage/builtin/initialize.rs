//! `03-kubernetes-initialize`: namespace, GPU drivers and cluster-wide setup.

use serde_json::json;

use crate::stage::{INITIALIZE_STAGE, StageEnv, StageOutputs, TerraformModule};
use super::{cluster_vars, kubeconfig};
use crate::check::check_namespace_exists;
use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::terraform::VarMap;

#[derive(Debug, Clone, Copy)]
pub struct KubernetesInitializeModule;

impl TerraformModule for KubernetesInitializeModule {
    fn name(&self) -> &'static str {
        INITIALIZE_STAGE
    }

    fn input_vars(&self, env: &StageEnv, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        let gpu_groups: Vec<String> = env
            .config
            .provider
            .node_groups()
            .into_iter()
            .filter(|(_, group)| group.gpu)
            .map(|(name, _)| name)
            .collect();

        let mut vars = cluster_vars(env);
        vars.insert("gpu_enabled".to_string(), json!(!gpu_groups.is_empty()));
        vars.insert("gpu_node_group_names".to_string(), json!(gpu_groups));
        Ok(vars)
    }

    fn check(
        &self,
        env: &StageEnv,
        ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        check_namespace_exists(
            INITIALIZE_STAGE,
            env.cluster.as_ref(),
            ctx,
            &kubeconfig(outputs)?,
            &env.config.namespace,
            &env.check_policy(),
        )
    }
}
