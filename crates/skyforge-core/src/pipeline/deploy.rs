//! Sequential, fail-fast deploy.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};

use super::ordered;
use crate::config::SkyforgeConfig;
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::stage::{Stage, StageOutputs};

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Skip post-deploy checks.
    pub disable_checks: bool,
    /// Persist outputs after every stage.
    pub outputs_path: Option<PathBuf>,
    /// Context the first stage runs in.
    pub context: ExecutionContext,
}

/// Deploy every stage in ascending order.
///
/// Per stage: input variables from the accumulated outputs, deploy, record
/// the outputs under the stage's name, enter the credential scope the stage
/// exposes, then check. Any error stops the run; earlier stages are left
/// standing.
pub fn run_deploy(
    stages: &[Box<dyn Stage>],
    config: &SkyforgeConfig,
    options: &DeployOptions,
) -> DeployResult<StageOutputs> {
    if config.prevent_deploy {
        return Err(DeployError::DeployPrevented);
    }

    let stages = ordered(stages)?;
    let mut outputs = StageOutputs::new();
    let mut ctx = options.context.clone();

    for stage in stages {
        let name = stage.name();
        let started = Instant::now();
        info!(stage = name, "deploying stage");

        let vars = stage.input_vars(&outputs)?;
        let produced = stage.deploy(&ctx, &outputs, &vars)?;
        outputs.record(name, produced);
        if let Some(path) = &options.outputs_path {
            outputs.redacted().save(path)?;
        }

        if let Some(scope) = stage.credentials(&ctx, &outputs)? {
            info!(stage = name, scope = scope.name(), "credentials in scope for remaining stages");
            ctx = ctx.scoped(scope);
        }

        if options.disable_checks {
            warn!(stage = name, "checks disabled");
        } else {
            stage.check(&ctx, &outputs)?;
        }

        info!(
            "stage {name} took {:.3} [s]",
            started.elapsed().as_secs_f64()
        );
    }

    info!(project = %config.project_name, "deployment complete");
    Ok(outputs)
}
