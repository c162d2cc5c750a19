//! Stages: the ordered units a pipeline deploys and destroys.

pub mod builtin;
pub mod env;
pub mod manifest;
pub mod outputs;
pub mod terraform;

use std::fmt;

use crate::credentials::{CredentialScope, ExecutionContext};
use crate::error::DeployResult;
use crate::render::RenderedFileSet;
use crate::terraform::VarMap;

pub use builtin::platform_stages;
pub use env::StageEnv;
pub use manifest::ManifestStage;
pub use outputs::{OutputMap, OutputValue, StageOutputs};
pub use terraform::{TerraformModule, TerraformStage};

pub const STATE_STAGE: &str = "01-terraform-state";
pub const INFRASTRUCTURE_STAGE: &str = "02-infrastructure";
pub const INITIALIZE_STAGE: &str = "03-kubernetes-initialize";
pub const INGRESS_STAGE: &str = "04-kubernetes-ingress";
pub const KEYCLOAK_STAGE: &str = "05-kubernetes-keycloak";
pub const KEYCLOAK_CONFIGURATION_STAGE: &str = "06-kubernetes-keycloak-configuration";
pub const SERVICES_STAGE: &str = "07-kubernetes-services";
pub const KUBERHEALTHY_STAGE: &str = "08-kubernetes-kuberhealthy";

/// One deployable unit.
///
/// Stages run in ascending name order on deploy and descending on destroy.
/// A stage reads the outputs of earlier stages and contributes its own; the
/// pipeline records them under [`Stage::name`].
pub trait Stage: fmt::Debug {
    /// Unique, sortable name such as `04-kubernetes-ingress`.
    fn name(&self) -> &str;

    /// Files this stage contributes to the output directory. Pure.
    fn render(&self) -> anyhow::Result<RenderedFileSet>;

    fn input_vars(&self, outputs: &StageOutputs) -> DeployResult<VarMap>;

    /// Bring the stage's resources to the desired state and return its outputs.
    fn deploy(
        &self,
        ctx: &ExecutionContext,
        outputs: &StageOutputs,
        vars: &VarMap,
    ) -> DeployResult<OutputMap>;

    /// Post-deploy validation.
    fn check(&self, _ctx: &ExecutionContext, _outputs: &StageOutputs) -> DeployResult<()> {
        Ok(())
    }

    /// Credentials this stage exposes to every later stage.
    fn credentials(
        &self,
        _ctx: &ExecutionContext,
        _outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        Ok(None)
    }

    /// Recover outputs of an already deployed stage without changing anything.
    fn refresh(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<OutputMap>;

    fn destroy(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<()>;
}
