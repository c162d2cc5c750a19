//! Stage pipeline executor.
//!
//! Deploy walks stages in ascending name order and stops at the first
//! failure. Destroy walks them in descending order and, by default, keeps
//! going past failures so one stuck stage cannot strand the rest.

pub mod deploy;
pub mod destroy;
pub mod render;

use std::collections::BTreeSet;

use crate::error::{DeployError, DeployResult};
use crate::stage::Stage;

pub use deploy::{DeployOptions, run_deploy};
pub use destroy::{DestroyOptions, DestroyReport, run_destroy};
pub use render::{RenderOptions, RenderReport, render_project};

/// Saved alongside the rendered output so later runs can inspect outputs.
pub const OUTPUTS_FILENAME: &str = ".skyforge-outputs.json";

/// Stages sorted ascending by name. Duplicate names are an invariant violation.
pub fn ordered(stages: &[Box<dyn Stage>]) -> DeployResult<Vec<&dyn Stage>> {
    let mut sorted: Vec<&dyn Stage> = stages.iter().map(|s| s.as_ref()).collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut seen = BTreeSet::new();
    for stage in &sorted {
        if !seen.insert(stage.name()) {
            return Err(DeployError::Invariant(format!(
                "duplicate stage name {}",
                stage.name()
            )));
        }
    }
    Ok(sorted)
}
