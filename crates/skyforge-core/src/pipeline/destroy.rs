//! Best-effort, reverse-order teardown.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use super::ordered;
use crate::config::SkyforgeConfig;
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::stage::{Stage, StageOutputs};

#[derive(Debug, Clone)]
pub struct DestroyOptions {
    /// Record a failing stage and continue instead of stopping.
    pub ignore_errors: bool,
    pub context: ExecutionContext,
}

impl Default for DestroyOptions {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            context: ExecutionContext::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DestroyReport {
    /// Stage name to whether its teardown succeeded.
    pub status: BTreeMap<String, bool>,
    /// Failure messages of stages whose teardown failed.
    pub errors: BTreeMap<String, String>,
    /// Outputs recovered before teardown.
    pub outputs: StageOutputs,
}

impl DestroyReport {
    pub fn succeeded(&self) -> bool {
        self.status.values().all(|ok| *ok)
    }

    pub fn failed_stages(&self) -> Vec<&str> {
        self.status
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Either keep going (recording the failure) or propagate it.
///
/// Invariant violations always propagate.
fn tolerate(
    ignore_errors: bool,
    stage: &str,
    phase: &str,
    err: DeployError,
) -> DeployResult<String> {
    if err.is_fatal_during_destroy() || !ignore_errors {
        return Err(err);
    }
    error!(stage, phase, error = %err, "continuing after failure");
    Ok(err.to_string())
}

/// Tear down every stage in descending order.
///
/// A forward pre-pass first recovers each stage's outputs and credential
/// scope without changing anything, so every stage is destroyed inside the
/// same context it was deployed in.
pub fn run_destroy(
    stages: &[Box<dyn Stage>],
    config: &SkyforgeConfig,
    options: &DestroyOptions,
) -> DeployResult<DestroyReport> {
    let stages = ordered(stages)?;
    let mut report = DestroyReport::default();
    let mut contexts = Vec::with_capacity(stages.len());
    let mut ctx = options.context.clone();

    info!(project = %config.project_name, "recovering stage outputs");
    for stage in &stages {
        let name = stage.name();
        contexts.push(ctx.clone());

        match stage.refresh(&ctx, &report.outputs) {
            Ok(produced) => report.outputs.record(name, produced),
            Err(e) => {
                let message = tolerate(options.ignore_errors, name, "refresh", e)?;
                warn!(stage = name, "outputs unavailable: {message}");
                continue;
            }
        }
        match stage.credentials(&ctx, &report.outputs) {
            Ok(Some(scope)) => ctx = ctx.scoped(scope),
            Ok(None) => {}
            Err(e) => {
                let message = tolerate(options.ignore_errors, name, "credentials", e)?;
                warn!(stage = name, "credentials unavailable: {message}");
            }
        }
    }

    for (stage, ctx) in stages.iter().zip(contexts.iter()).rev() {
        let name = stage.name();
        info!(stage = name, "destroying stage");
        match stage.destroy(ctx, &report.outputs) {
            Ok(()) => {
                report.status.insert(name.to_string(), true);
            }
            Err(e) => {
                let message = tolerate(options.ignore_errors, name, "destroy", e)?;
                report.status.insert(name.to_string(), false);
                report.errors.insert(name.to_string(), message);
            }
        }
    }

    if report.succeeded() {
        info!(project = %config.project_name, "destroy complete");
    } else {
        warn!(failed = ?report.failed_stages(), "destroy finished with failures");
    }
    Ok(report)
}
