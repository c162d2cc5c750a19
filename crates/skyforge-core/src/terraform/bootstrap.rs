//! Idempotent state bootstrap: adopt resources that already exist, then apply.
//!
//! The state stage owns the bucket (and lock table) that every later stage
//! stores its state in. Its own state is local, so on a fresh machine that
//! state is empty even though the bucket may already exist. Importing first
//! means a re-run adopts the bucket instead of failing to create it.

use std::path::Path;

use tracing::{info, warn};

use super::{ImportOutcome, InfraTool, StateImport, VarMap};
use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::stage::OutputMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    pub imported: Vec<String>,
    /// Resources absent remotely; apply creates them.
    pub absent: Vec<String>,
    pub already_managed: Vec<String>,
    pub outputs: OutputMap,
}

/// `init`, import every entry, `apply`, then read outputs.
///
/// An import reporting [`ImportOutcome::NotFound`] or
/// [`ImportOutcome::AlreadyManaged`] is expected. Any other import failure is
/// returned before `apply` runs.
pub fn bootstrap_state(
    tool: &dyn InfraTool,
    ctx: &ExecutionContext,
    dir: &Path,
    vars: &VarMap,
    imports: &[StateImport],
) -> DeployResult<BootstrapReport> {
    tool.init(ctx, dir)?;
    let mut report = import_all(tool, ctx, dir, vars, imports)?;
    tool.apply(ctx, dir, vars, &[])?;
    report.outputs = tool.output(ctx, dir)?;
    Ok(report)
}

/// `init` and imports without `apply`, then read outputs.
///
/// Used before teardown to recover outputs of an already deployed directory.
pub fn refresh_state(
    tool: &dyn InfraTool,
    ctx: &ExecutionContext,
    dir: &Path,
    vars: &VarMap,
    imports: &[StateImport],
) -> DeployResult<OutputMap> {
    tool.init(ctx, dir)?;
    import_all(tool, ctx, dir, vars, imports)?;
    tool.output(ctx, dir)
}

fn import_all(
    tool: &dyn InfraTool,
    ctx: &ExecutionContext,
    dir: &Path,
    vars: &VarMap,
    imports: &[StateImport],
) -> DeployResult<BootstrapReport> {
    let mut report = BootstrapReport::default();
    for import in imports {
        match tool.import(ctx, dir, vars, import) {
            Ok(ImportOutcome::Imported) => {
                info!(resource = %import.address, id = %import.id, "imported existing resource");
                report.imported.push(import.address.clone());
            }
            Ok(ImportOutcome::NotFound) => {
                info!(resource = %import.address, "resource does not exist yet, apply will create it");
                report.absent.push(import.address.clone());
            }
            Ok(ImportOutcome::AlreadyManaged) => {
                info!(resource = %import.address, "resource already in state");
                report.already_managed.push(import.address.clone());
            }
            Err(e) => {
                warn!(resource = %import.address, error = %e, "import failed");
                return Err(e);
            }
        }
    }
    Ok(report)
}
