//! Upgrade migration chain for the deployment document.
//!
//! Each [`MigrationStep`] moves a document from the version before it to its
//! own version. [`upgrade`] applies every step in `(start, finish]` in
//! ascending order, so migrating A to C equals migrating A to B then B to C.

pub mod command;
pub mod steps;

use std::fmt;

use regex::Regex;
use semver::Version;
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::error::{DeployError, DeployResult};

pub use command::{UpgradeStatus, upgrade_config_file};
pub use steps::MIGRATIONS;

/// Version this build writes into upgraded documents.
pub const RELEASE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Document key recording the version a document was written for.
pub const VERSION_FIELD: &str = "version";

/// What a transform sees besides the document.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Version the document is at before this step; `None` when unversioned.
    pub from: Option<Version>,
    pub to: Version,
}

/// Returns human-readable notices for the operator.
pub type Transform = fn(&mut Mapping, &StepContext) -> anyhow::Result<Vec<String>>;

#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub version: &'static str,
    /// Whether the step records its version in the document.
    pub requires_version_field: bool,
    pub transform: Transform,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("requires_version_field", &self.requires_version_field)
            .finish_non_exhaustive()
    }
}

impl MigrationStep {
    pub fn parsed_version(&self) -> DeployResult<Version> {
        Version::parse(self.version).map_err(|e| {
            DeployError::Invariant(format!("migration step version {}: {e}", self.version))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeOutcome {
    pub from: Option<Version>,
    pub to: Version,
    /// Versions of the steps that ran, ascending.
    pub applied: Vec<Version>,
    pub notices: Vec<String>,
}

/// Version recorded in `document`, if any.
pub fn document_version(document: &Value) -> DeployResult<Option<Version>> {
    match document.get(VERSION_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Version::parse(raw)
            .map(Some)
            .map_err(|e| DeployError::Config(format!("version {raw:?} is not a valid version: {e}"))),
        Some(other) => Err(DeployError::Config(format!(
            "version must be a string, found {other:?}"
        ))),
    }
}

/// Steps with `start < version <= finish`, ascending.
pub fn select_steps(
    table: &[MigrationStep],
    start: &Version,
    finish: &Version,
) -> DeployResult<Vec<(Version, MigrationStep)>> {
    let mut chain = Vec::new();
    for step in table {
        let version = step.parsed_version()?;
        if &version > start && &version <= finish {
            chain.push((version, *step));
        }
    }
    chain.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(pair) = chain.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(DeployError::Invariant(format!(
            "duplicate migration step for version {}",
            pair[0].0
        )));
    }
    Ok(chain)
}

/// Migrate `document` from its recorded version (0.0.0 when absent) to
/// `finish`.
///
/// The document is only replaced once every step succeeded. A `finish`
/// older than the document's version is an error and leaves it untouched.
pub fn upgrade(
    document: &mut Value,
    finish: &Version,
    table: &[MigrationStep],
) -> DeployResult<UpgradeOutcome> {
    let from = document_version(document)?;
    let start = from.clone().unwrap_or_else(|| Version::new(0, 0, 0));
    if finish < &start {
        return Err(DeployError::Config(format!(
            "the configuration belongs to a later version ({start}) than this tool ({finish}); \
             upgrade the tool to work with this deployment"
        )));
    }

    let Value::Mapping(original) = &*document else {
        return Err(DeployError::Config(
            "configuration file must be a mapping at the top level".to_string(),
        ));
    };
    let mut working = original.clone();

    let mut outcome = UpgradeOutcome {
        from: from.clone(),
        to: finish.clone(),
        applied: Vec::new(),
        notices: Vec::new(),
    };

    let mut current = from;
    for (version, step) in select_steps(table, &start, finish)? {
        info!(
            from = %current.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "old version".to_string()),
            to = %version,
            "upgrade step"
        );
        if step.requires_version_field {
            working.insert(
                Value::String(VERSION_FIELD.to_string()),
                Value::String(version.to_string()),
            );
        }
        rewrite_image_tags(&mut working, current.as_ref(), &version);

        let ctx = StepContext {
            from: current.clone(),
            to: version.clone(),
        };
        let notices = (step.transform)(&mut working, &ctx)
            .map_err(|e| DeployError::Other(e.context(format!("upgrade step {version} failed"))))?;
        outcome.notices.extend(notices);
        outcome.applied.push(version.clone());
        current = Some(version);
    }

    *document = Value::Mapping(working);
    Ok(outcome)
}

/// Tag pattern of releases that predate the version field.
const UNVERSIONED_TAG: &str = r"0\.[0-3]\.[0-9]{1,2}";

/// `<org>/<name>:v<from>` becomes `<org>/<name>:v<to>` for every entry of
/// `default_images`.
fn rewrite_image_tags(document: &mut Mapping, from: Option<&Version>, to: &Version) {
    let tag = match from {
        Some(v) => regex::escape(&v.to_string()),
        None => UNVERSIONED_TAG.to_string(),
    };
    let Ok(pattern) = Regex::new(&format!(r"^([A-Za-z0-9_-]+/[A-Za-z0-9_-]+):v{tag}$")) else {
        return;
    };

    let Some(Value::Mapping(images)) = document.get_mut("default_images") else {
        return;
    };
    for (_, image) in images.iter_mut() {
        let Value::String(current) = image else {
            continue;
        };
        if let Some(caps) = pattern.captures(current) {
            *current = format!("{}:v{to}", &caps[1]);
        }
    }
}
