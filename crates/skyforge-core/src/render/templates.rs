//! Collect a template directory into a [`RenderedFileSet`].
//!
//! Templates are copied verbatim; only their location changes. Ignored state
//! files and directories are skipped the same way the diff skips them.

use std::fs;
use std::path::Path;

use anyhow::Context;

use super::RenderedFileSet;
use super::hash::IgnoreRules;

/// Add every file under `source_dir` to a new set, keyed under `dest_prefix`.
///
/// A missing `source_dir` yields an empty set.
pub fn collect_templates(
    source_dir: &Path,
    dest_prefix: &str,
    ignore: &IgnoreRules,
) -> anyhow::Result<RenderedFileSet> {
    let mut set = RenderedFileSet::new();
    if !source_dir.is_dir() {
        return Ok(set);
    }
    collect_recursive(&mut set, source_dir, dest_prefix, ignore)?;
    Ok(set)
}

fn collect_recursive(
    set: &mut RenderedFileSet,
    dir: &Path,
    dest: &str,
    ignore: &IgnoreRules,
) -> anyhow::Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read template directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read template entries: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let target = if dest.is_empty() {
            name.clone()
        } else {
            format!("{dest}/{name}")
        };
        let path = entry.path();
        let metadata = fs::metadata(&path)
            .with_context(|| format!("Failed to stat template: {}", path.display()))?;

        if metadata.is_dir() {
            if !ignore.directories.contains(&name) {
                collect_recursive(set, &path, &target, ignore)?;
            }
        } else if !ignore.filenames.contains(&name) {
            set.insert_copy(&target, path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FileSource;
    use tempfile::TempDir;

    #[test]
    fn copies_tree_under_prefix_and_skips_state() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("02-infrastructure/aws");
        fs::create_dir_all(src.join("modules/network")).unwrap();
        fs::create_dir_all(src.join(".terraform")).unwrap();
        fs::write(src.join("main.tf"), "module {}").unwrap();
        fs::write(src.join("modules/network/main.tf"), "vpc").unwrap();
        fs::write(src.join("terraform.tfstate"), "{}").unwrap();
        fs::write(src.join(".terraform/plugin"), "bin").unwrap();

        let set = collect_templates(
            &src,
            "stages/02-infrastructure/aws",
            &IgnoreRules::default(),
        )
        .unwrap();

        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![
                "stages/02-infrastructure/aws/main.tf",
                "stages/02-infrastructure/aws/modules/network/main.tf",
            ]
        );
        assert!(matches!(
            set.get("stages/02-infrastructure/aws/main.tf"),
            Some(FileSource::Copy(_))
        ));
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let set = collect_templates(&tmp.path().join("nope"), "x", &IgnoreRules::default()).unwrap();
        assert!(set.is_empty());
    }
}
