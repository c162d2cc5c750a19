//! File-level diff between a rendered set and an existing output directory.

use std::collections::BTreeSet;
use std::path::Path;

use super::RenderedFileSet;
use super::hash::{IgnoreRules, hash_output_tree};

/// Four disjoint sets of relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Rendered, absent on disk.
    pub new: BTreeSet<String>,
    /// Rendered and on disk with different content.
    pub updated: BTreeSet<String>,
    /// Legacy paths present on disk that must be removed.
    pub deleted: BTreeSet<String>,
    /// On disk only, left alone.
    pub untracked: BTreeSet<String>,
}

impl FileDiff {
    /// True when applying would not touch the filesystem.
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Paths that apply will write.
    pub fn writes(&self) -> impl Iterator<Item = &String> {
        self.new.iter().chain(self.updated.iter())
    }
}

/// Classify every rendered and existing path.
///
/// A legacy path counts as deleted only if it exists under `output_dir` and
/// neither it nor anything beneath it is rendered; files beneath a deleted directory are not reported
/// as untracked. Containment of deleted paths is enforced by
/// [`super::apply`], so a plan and its application always agree.
pub fn diff(
    rendered: &RenderedFileSet,
    output_dir: &Path,
    legacy_paths: &[&str],
    ignore: &IgnoreRules,
) -> anyhow::Result<FileDiff> {
    let desired = rendered.content_hashes()?;
    let existing = hash_output_tree(output_dir, ignore)?;

    let mut result = FileDiff::default();

    for (path, hash) in &desired {
        match existing.get(path) {
            None => {
                result.new.insert(path.clone());
            }
            Some(current) if current != hash => {
                result.updated.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for legacy in legacy_paths {
        let legacy = legacy.trim_end_matches('/');
        let prefix = format!("{legacy}/");
        if rendered.contains(legacy) || rendered.paths().any(|p| p.starts_with(&prefix)) {
            continue;
        }
        if output_dir.join(legacy).symlink_metadata().is_ok() {
            result.deleted.insert(legacy.to_string());
        }
    }

    for path in existing.keys() {
        if desired.contains_key(path) {
            continue;
        }
        let under_deleted = result
            .deleted
            .iter()
            .any(|d| path == d || path.starts_with(&format!("{d}/")));
        if !under_deleted {
            result.untracked.insert(path.clone());
        }
    }

    Ok(result)
}
