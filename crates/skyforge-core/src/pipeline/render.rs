//! Render every stage into the output directory.

use std::path::Path;

use tracing::info;

use super::ordered;
use crate::config::SkyforgeConfig;
use crate::error::{DeployError, DeployResult};
use crate::render::cicd::render_cicd;
use crate::render::{
    ApplyReport, FileDiff, IgnoreRules, LEGACY_PATHS, RenderedFileSet, apply, diff,
};
use crate::stage::Stage;
use crate::upgrade::RELEASE_VERSION;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Classify and report only.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub diff: FileDiff,
    pub applied: ApplyReport,
}

/// Combined output of every stage plus CI/CD files.
pub fn render_all(
    stages: &[Box<dyn Stage>],
    config: &SkyforgeConfig,
) -> DeployResult<RenderedFileSet> {
    let mut files = RenderedFileSet::new();
    for stage in ordered(stages)? {
        files.extend(stage.render()?);
    }
    files.extend(render_cicd(config, RELEASE_VERSION)?);
    Ok(files)
}

/// Render, diff against `output_dir` and apply the difference.
///
/// Rendering straight into the home directory is refused.
pub fn render_project(
    stages: &[Box<dyn Stage>],
    config: &SkyforgeConfig,
    output_dir: &Path,
    options: RenderOptions,
) -> DeployResult<RenderReport> {
    refuse_home_dir(output_dir)?;

    let rendered = render_all(stages, config)?;
    let ignore = IgnoreRules::default();
    let file_diff = diff(&rendered, output_dir, LEGACY_PATHS, &ignore)?;
    info!(
        new = file_diff.new.len(),
        updated = file_diff.updated.len(),
        deleted = file_diff.deleted.len(),
        untracked = file_diff.untracked.len(),
        directory = %output_dir.display(),
        "render reconciled"
    );

    let applied = apply(&file_diff, &rendered, output_dir, options.dry_run)?;
    Ok(RenderReport {
        diff: file_diff,
        applied,
    })
}

fn refuse_home_dir(output_dir: &Path) -> DeployResult<()> {
    let Some(home) = dirs::home_dir() else {
        return Ok(());
    };
    let same = match (output_dir.canonicalize(), home.canonicalize()) {
        (Ok(out), Ok(home)) => out == home,
        _ => false,
    };
    if same {
        return Err(DeployError::Config(format!(
            "refusing to render into the home directory {}; choose a project directory",
            home.display()
        )));
    }
    Ok(())
}
