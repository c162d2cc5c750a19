//! Infrastructure-as-code driver.
//!
//! [`InfraTool`] is the seam between stages and the external binary; the
//! production implementation is [`TerraformCli`], tests substitute fakes.

pub mod bootstrap;
pub mod cli;
pub mod objects;

use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::stage::OutputMap;

pub use bootstrap::{BootstrapReport, bootstrap_state, refresh_state};
pub use cli::TerraformCli;
pub use objects::{Backend, deep_merge, merge_all};

/// Input variables handed to the tool as a var-file.
pub type VarMap = Map<String, Value>;

/// A resource that may already exist outside of state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateImport {
    /// Address inside the configuration, e.g. `module.state.aws_s3_bucket.main`.
    pub address: String,
    /// Provider-specific identifier of the existing resource.
    pub id: String,
}

impl StateImport {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StateImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.address, self.id)
    }
}

/// How an import attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    /// The remote resource does not exist yet; apply will create it.
    NotFound,
    /// State already tracks the resource.
    AlreadyManaged,
}

pub trait InfraTool: fmt::Debug + Send + Sync {
    fn init(&self, ctx: &ExecutionContext, dir: &Path) -> DeployResult<()>;

    fn import(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        vars: &VarMap,
        import: &StateImport,
    ) -> DeployResult<ImportOutcome>;

    /// Apply; an empty `targets` slice applies everything.
    fn apply(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        vars: &VarMap,
        targets: &[String],
    ) -> DeployResult<()>;

    fn output(&self, ctx: &ExecutionContext, dir: &Path) -> DeployResult<OutputMap>;

    fn destroy(&self, ctx: &ExecutionContext, dir: &Path, vars: &VarMap) -> DeployResult<()>;
}
