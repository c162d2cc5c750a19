//! Stages backed by a terraform directory.
//!
//! [`TerraformModule`] describes what differs between stages (variables,
//! provider blocks, checks, credentials). [`TerraformStage`] turns any module
//! into a [`Stage`]: it renders `_skyforge.tf.json` plus the stage's
//! templates and drives the [`crate::terraform::InfraTool`].

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use super::{OutputMap, Stage, StageEnv, StageOutputs};
use crate::credentials::{CredentialScope, ExecutionContext};
use crate::error::DeployResult;
use crate::provider::state_backend_for;
use crate::render::{IgnoreRules, RenderedFileSet, collect_templates};
use crate::terraform::objects::to_tf_json;
use crate::terraform::{StateImport, VarMap, bootstrap_state, refresh_state};

/// File every terraform stage renders its generated blocks into.
pub const GENERATED_TF_FILE: &str = "_skyforge.tf.json";

pub trait TerraformModule: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Directory relative to the output root.
    fn directory(&self, _env: &StageEnv) -> String {
        format!("stages/{}", self.name())
    }

    /// Whether the stage stores its state in the configured backend.
    fn remote_state(&self) -> bool {
        true
    }

    fn tf_objects(&self, env: &StageEnv) -> Vec<Value> {
        env.provider.kubernetes_objects()
    }

    fn input_vars(&self, env: &StageEnv, outputs: &StageOutputs) -> DeployResult<VarMap>;

    /// Existing resources to adopt before the first apply.
    fn state_imports(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
    ) -> DeployResult<Vec<StateImport>> {
        Ok(Vec::new())
    }

    /// Credentials the stage's own tool invocations need.
    fn own_credentials(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
    ) -> DeployResult<Option<CredentialScope>> {
        Ok(None)
    }

    fn check(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
        _outputs: &StageOutputs,
    ) -> DeployResult<()> {
        Ok(())
    }

    fn credentials(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
        _outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        Ok(None)
    }
}

#[derive(Debug)]
pub struct TerraformStage<M> {
    module: M,
    env: StageEnv,
}

impl<M: TerraformModule> TerraformStage<M> {
    pub fn new(module: M, env: StageEnv) -> Self {
        Self { module, env }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    fn working_dir(&self) -> PathBuf {
        self.env.output_dir().join(self.module.directory(&self.env))
    }

    fn context(&self, ctx: &ExecutionContext) -> DeployResult<ExecutionContext> {
        Ok(match self.module.own_credentials(&self.env, ctx)? {
            Some(scope) => ctx.scoped(scope),
            None => ctx.clone(),
        })
    }

    fn generated_objects(&self) -> Vec<Value> {
        let mut objects = Vec::new();
        if self.module.remote_state() {
            if let Some(backend) =
                state_backend_for(&self.env.config, self.env.provider.as_ref(), self.module.name())
            {
                objects.push(backend.to_object());
            }
        }
        objects.extend(self.module.tf_objects(&self.env));
        objects
    }
}

impl<M: TerraformModule> Stage for TerraformStage<M> {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn render(&self) -> anyhow::Result<RenderedFileSet> {
        let directory = self.module.directory(&self.env);
        let template_key = directory.strip_prefix("stages/").unwrap_or(&directory);

        let mut files = match self.env.template_dir(template_key) {
            Some(source) => collect_templates(&source, &directory, &IgnoreRules::default())?,
            None => RenderedFileSet::new(),
        };
        files.insert_generated(
            format!("{directory}/{GENERATED_TF_FILE}"),
            to_tf_json(&self.generated_objects())?,
        )?;
        Ok(files)
    }

    fn input_vars(&self, outputs: &StageOutputs) -> DeployResult<VarMap> {
        self.module.input_vars(&self.env, outputs)
    }

    fn deploy(
        &self,
        ctx: &ExecutionContext,
        _outputs: &StageOutputs,
        vars: &VarMap,
    ) -> DeployResult<OutputMap> {
        let ctx = self.context(ctx)?;
        let imports = self.module.state_imports(&self.env, &ctx)?;
        let report = bootstrap_state(
            self.env.tool.as_ref(),
            &ctx,
            &self.working_dir(),
            vars,
            &imports,
        )?;
        if !imports.is_empty() {
            info!(
                stage = self.name(),
                imported = report.imported.len(),
                absent = report.absent.len(),
                already_managed = report.already_managed.len(),
                "state resources reconciled"
            );
        }
        Ok(report.outputs)
    }

    fn check(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<()> {
        self.module.check(&self.env, ctx, outputs)
    }

    fn credentials(
        &self,
        ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        self.module.credentials(&self.env, ctx, outputs)
    }

    fn refresh(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<OutputMap> {
        let ctx = self.context(ctx)?;
        let vars = self.module.input_vars(&self.env, outputs)?;
        let imports = self.module.state_imports(&self.env, &ctx)?;
        refresh_state(
            self.env.tool.as_ref(),
            &ctx,
            &self.working_dir(),
            &vars,
            &imports,
        )
    }

    fn destroy(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<()> {
        let ctx = self.context(ctx)?;
        let vars = self.module.input_vars(&self.env, outputs)?;
        let dir = self.working_dir();
        self.env.tool.init(&ctx, &dir)?;
        self.env.tool.destroy(&ctx, &dir, &vars)
    }
}
