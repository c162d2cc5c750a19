//! [`InfraTool`] backed by the terraform (or OpenTofu) binary.

use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::{ImportOutcome, InfraTool, StateImport, VarMap};
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::process::{ProcessOutput, run_streaming};
use crate::stage::OutputMap;

const LOG_PREFIX: &str = "terraform";

#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
    import_timeout: Duration,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>, import_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            import_timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, ctx: &ExecutionContext, dir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.current_dir(dir);
        command.env("TF_IN_AUTOMATION", "1");
        ctx.apply_to(&mut command);
        command
    }

    fn run(
        &self,
        verb: &str,
        dir: &Path,
        command: &mut Command,
        timeout: Option<Duration>,
    ) -> DeployResult<ProcessOutput> {
        info!(directory = %dir.display(), "terraform {verb}");
        let started = Instant::now();
        let output = run_streaming(command, LOG_PREFIX, timeout)
            .with_context(|| format!("Failed to run {} {}", self.binary, verb))?;
        info!(
            "terraform {verb} took {:.3} [s]",
            started.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    fn ensure_success(&self, verb: &str, dir: &Path, output: &ProcessOutput) -> DeployResult<()> {
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::tool(&self.binary, verb, output.code(), dir))
        }
    }
}

/// Write `vars` to a temporary `*.tfvars.json` file kept alive by the handle.
fn write_var_file(vars: &VarMap) -> DeployResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("skyforge-")
        .suffix(".tfvars.json")
        .tempfile()
        .context("Failed to create tfvars file")?;
    let content = serde_json::to_vec(vars).context("Failed to serialize input variables")?;
    file.write_all(&content)
        .and_then(|_| file.flush())
        .context("Failed to write tfvars file")?;
    Ok(file)
}

fn var_file_arg(file: &NamedTempFile) -> String {
    format!("-var-file={}", file.path().display())
}

/// Recognise benign import failures from the tool's error output.
///
/// Only a missing remote object counts as not found: terraform's own wording
/// or a provider 404 for the object being imported. Anything else, including
/// configuration and credential errors, is left unclassified.
pub fn classify_import_failure(stderr: &str) -> Option<ImportOutcome> {
    let lower = stderr.to_lowercase();
    if lower.contains("resource already managed") {
        return Some(ImportOutcome::AlreadyManaged);
    }
    const NOT_FOUND_MARKERS: &[&str] = &[
        "cannot import non-existent remote object",
        "googleapi: error 404",
        "statuscode=404",
        "nosuchbucket",
        "resourcenotfoundexception",
        "resourcegroupnotfound",
    ];
    NOT_FOUND_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
        .then_some(ImportOutcome::NotFound)
}

impl InfraTool for TerraformCli {
    fn init(&self, ctx: &ExecutionContext, dir: &Path) -> DeployResult<()> {
        let mut command = self.command(ctx, dir);
        command.args(["init", "-input=false", "-upgrade"]);
        let output = self.run("init", dir, &mut command, None)?;
        self.ensure_success("init", dir, &output)
    }

    fn import(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        vars: &VarMap,
        import: &StateImport,
    ) -> DeployResult<ImportOutcome> {
        let var_file = write_var_file(vars)?;
        let mut command = self.command(ctx, dir);
        command
            .args(["import", "-input=false"])
            .arg(var_file_arg(&var_file))
            .arg(&import.address)
            .arg(&import.id);
        let output = self.run("import", dir, &mut command, Some(self.import_timeout))?;

        if output.success() {
            return Ok(ImportOutcome::Imported);
        }
        if output.timed_out {
            warn!(resource = %import.address, "import timed out");
            return Err(DeployError::tool(&self.binary, "import", output.code(), dir));
        }
        match classify_import_failure(&output.stderr) {
            Some(outcome) => Ok(outcome),
            None => Err(DeployError::tool(&self.binary, "import", output.code(), dir)),
        }
    }

    fn apply(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        vars: &VarMap,
        targets: &[String],
    ) -> DeployResult<()> {
        let var_file = write_var_file(vars)?;
        let mut command = self.command(ctx, dir);
        command
            .args(["apply", "-auto-approve", "-input=false"])
            .args(targets.iter().map(|t| format!("-target={t}")))
            .arg(var_file_arg(&var_file));
        let output = self.run("apply", dir, &mut command, None)?;
        self.ensure_success("apply", dir, &output)
    }

    fn output(&self, ctx: &ExecutionContext, dir: &Path) -> DeployResult<OutputMap> {
        // Outputs may be sensitive, so they are captured and never streamed.
        let started = Instant::now();
        let output = self
            .command(ctx, dir)
            .args(["output", "-json"])
            .output()
            .with_context(|| format!("Failed to run {} output", self.binary))?;
        info!(
            "terraform output took {:.3} [s]",
            started.elapsed().as_secs_f64()
        );
        if !output.status.success() {
            warn!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "terraform output failed");
            return Err(DeployError::tool(
                &self.binary,
                "output",
                output.status.code().unwrap_or(-1),
                dir,
            ));
        }
        let parsed: OutputMap = serde_json::from_slice(&output.stdout)
            .context("Failed to parse terraform output JSON")?;
        Ok(parsed)
    }

    fn destroy(&self, ctx: &ExecutionContext, dir: &Path, vars: &VarMap) -> DeployResult<()> {
        let var_file = write_var_file(vars)?;
        let mut command = self.command(ctx, dir);
        command
            .args(["destroy", "-auto-approve", "-input=false"])
            .arg(var_file_arg(&var_file));
        let output = self.run("destroy", dir, &mut command, None)?;
        self.ensure_success("destroy", dir, &output)
    }
}
