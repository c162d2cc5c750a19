//! `01-terraform-state`: the bucket every later stage stores its state in.

use serde_json::Value;

use crate::stage::{STATE_STAGE, StageEnv, StageOutputs, TerraformModule};
use crate::credentials::{CredentialScope, ExecutionContext};
use crate::error::DeployResult;
use crate::terraform::{StateImport, VarMap};

/// Keeps its own state locally and adopts an existing bucket on re-runs.
#[derive(Debug, Clone, Copy)]
pub struct TerraformStateModule;

impl TerraformModule for TerraformStateModule {
    fn name(&self) -> &'static str {
        STATE_STAGE
    }

    fn directory(&self, env: &StageEnv) -> String {
        format!("stages/{}/{}", STATE_STAGE, env.provider.kind().as_str())
    }

    fn remote_state(&self) -> bool {
        false
    }

    fn tf_objects(&self, env: &StageEnv) -> Vec<Value> {
        env.provider.cloud_objects()
    }

    fn input_vars(&self, env: &StageEnv, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        env.provider.input_vars(STATE_STAGE)
    }

    fn state_imports(
        &self,
        env: &StageEnv,
        ctx: &ExecutionContext,
    ) -> DeployResult<Vec<StateImport>> {
        env.provider.state_imports(ctx)
    }

    fn own_credentials(
        &self,
        env: &StageEnv,
        ctx: &ExecutionContext,
    ) -> DeployResult<Option<CredentialScope>> {
        env.provider.state_credentials(ctx)
    }

    /// The backend credentials stay in scope for every later stage.
    fn credentials(
        &self,
        env: &StageEnv,
        ctx: &ExecutionContext,
        _outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        env.provider.state_credentials(ctx)
    }
}
