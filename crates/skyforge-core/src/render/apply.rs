//! Apply a [`FileDiff`] to an output directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use super::{FileDiff, FileSource, RenderedFileSet};
use crate::error::{DeployError, DeployResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
    pub dry_run: bool,
}

/// Remove deleted paths, then write new and updated files.
///
/// Every target is resolved and checked against `output_dir` before anything
/// is touched; a path that escapes it is a [`DeployError::Invariant`]. With
/// `dry_run` the same checks run and nothing is written.
pub fn apply(
    diff: &FileDiff,
    rendered: &RenderedFileSet,
    output_dir: &Path,
    dry_run: bool,
) -> DeployResult<ApplyReport> {
    let writes = diff
        .writes()
        .map(|rel| Ok((rel.clone(), resolve_within(output_dir, rel)?)))
        .collect::<DeployResult<Vec<_>>>()?;
    let deletes = diff
        .deleted
        .iter()
        .map(|rel| Ok((rel.clone(), resolve_within(output_dir, rel)?)))
        .collect::<DeployResult<Vec<_>>>()?;

    let mut report = ApplyReport {
        dry_run,
        ..ApplyReport::default()
    };

    if dry_run {
        info!("dry-run enabled, no files will be created, updated, or deleted");
        report.written = writes.into_iter().map(|(rel, _)| rel).collect();
        report.deleted = deletes.into_iter().map(|(rel, _)| rel).collect();
        return Ok(report);
    }

    fs::create_dir_all(output_dir).map_err(|e| DeployError::io(output_dir, e))?;

    for (rel, target) in deletes {
        remove_path(&target)?;
        debug!(path = %rel, "removed legacy path");
        report.deleted.push(rel);
    }

    for (rel, target) in writes {
        let source = rendered.get(&rel).ok_or_else(|| {
            DeployError::Invariant(format!("diff references unrendered path {rel}"))
        })?;
        write_atomically(&target, source)?;
        debug!(path = %rel, "wrote rendered file");
        report.written.push(rel);
    }

    Ok(report)
}

/// Resolve `relative` under `root`, refusing anything that is not a strict
/// descendant of it.
pub fn resolve_within(root: &Path, relative: &str) -> DeployResult<PathBuf> {
    let root_abs = if root.exists() {
        root.canonicalize().map_err(|e| DeployError::io(root, e))?
    } else {
        std::path::absolute(root).map_err(|e| DeployError::io(root, e))?
    };

    let candidate = lexical_normalize(&root_abs.join(relative));
    if !candidate.starts_with(&root_abs) || candidate == root_abs {
        return Err(DeployError::Invariant(format!(
            "path={} resolves to {} which is outside of output directory {}",
            relative,
            candidate.display(),
            root_abs.display()
        )));
    }

    // A symlinked parent directory could still point elsewhere.
    if let Some(parent) = candidate.parent().filter(|p| p.exists()) {
        let real_parent = parent
            .canonicalize()
            .map_err(|e| DeployError::io(parent, e))?;
        if !real_parent.starts_with(&root_abs) {
            return Err(DeployError::Invariant(format!(
                "path={} has parent {} outside of output directory {}",
                relative,
                real_parent.display(),
                root_abs.display()
            )));
        }
    }

    Ok(candidate)
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn write_atomically(target: &Path, source: &FileSource) -> DeployResult<()> {
    let parent = target
        .parent()
        .ok_or_else(|| DeployError::Invariant(format!("{} has no parent", target.display())))?;
    fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = parent.join(format!(".{file_name}.skyforge-tmp"));

    let staged = match source {
        FileSource::Generated(bytes) => {
            fs::write(&staging, bytes).map_err(|e| DeployError::io(&staging, e))
        }
        FileSource::Copy(src) => fs::copy(src, &staging)
            .map(|_| ())
            .map_err(|e| DeployError::io(src, e)),
    }
    .and_then(|()| fs::rename(&staging, target).map_err(|e| DeployError::io(target, e)));

    if staged.is_err() {
        let _ = fs::remove_file(&staging);
    }
    staged
}

fn remove_path(target: &Path) -> DeployResult<()> {
    let metadata = match fs::symlink_metadata(target) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DeployError::io(target, e)),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(target).map_err(|e| DeployError::io(target, e))
    } else {
        fs::remove_file(target).map_err(|e| DeployError::io(target, e))
    }
}
