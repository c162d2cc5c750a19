//! `02-infrastructure`: the Kubernetes cluster itself.

use serde_json::{Value, json};

use super::{kubeconfig, kubeconfig_target};
use crate::check::check_nodes_ready;
use crate::credentials::{CredentialScope, ExecutionContext, KUBERNETES_CREDENTIALS};
use crate::error::DeployResult;
use crate::provider::ProjectIdentity;
use crate::stage::{INFRASTRUCTURE_STAGE, StageEnv, StageOutputs, TerraformModule};
use crate::terraform::VarMap;

#[derive(Debug, Clone, Copy)]
pub struct InfrastructureModule;

impl TerraformModule for InfrastructureModule {
    fn name(&self) -> &'static str {
        INFRASTRUCTURE_STAGE
    }

    fn directory(&self, env: &StageEnv) -> String {
        format!(
            "stages/{}/{}",
            INFRASTRUCTURE_STAGE,
            env.provider.kind().as_str()
        )
    }

    fn tf_objects(&self, env: &StageEnv) -> Vec<Value> {
        env.provider.cloud_objects()
    }

    fn input_vars(&self, env: &StageEnv, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        let mut vars = env.provider.input_vars(INFRASTRUCTURE_STAGE)?;
        let identity = ProjectIdentity::from_config(&env.config);
        vars.insert(
            "kubeconfig_filename".to_string(),
            json!(kubeconfig_target(&identity).display().to_string()),
        );
        Ok(vars)
    }

    fn check(
        &self,
        env: &StageEnv,
        ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        check_nodes_ready(
            INFRASTRUCTURE_STAGE,
            env.cluster.as_ref(),
            ctx,
            &kubeconfig(outputs)?,
            &env.check_policy(),
        )
    }

    fn credentials(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        let credentials = outputs.object_value(INFRASTRUCTURE_STAGE, "kubernetes_credentials")?;
        Ok(Some(CredentialScope::from_mapping(
            "kubernetes",
            KUBERNETES_CREDENTIALS,
            credentials,
        )))
    }
}
