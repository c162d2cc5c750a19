//! Content hashing for render reconciliation.
//!
//! Every file is identified by `blake3(content)` as a hex string. A whole
//! output tree is summarised as a map of relative path to content hash,
//! skipping local tool state that must never be reconciled.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;

/// Filenames and directory names excluded when hashing an output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    pub filenames: Vec<String>,
    pub directories: Vec<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            filenames: vec![
                "terraform.tfstate".to_string(),
                ".terraform.lock.hcl".to_string(),
                "terraform.tfstate.backup".to_string(),
            ],
            directories: vec![".terraform".to_string(), "__pycache__".to_string()],
        }
    }
}

impl IgnoreRules {
    fn ignores_file(&self, name: &str) -> bool {
        self.filenames.iter().any(|f| f == name)
    }

    fn ignores_dir(&self, name: &str) -> bool {
        self.directories.iter().any(|d| d == name)
    }
}

pub fn hash_bytes(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

pub fn hash_file(path: &Path) -> anyhow::Result<String> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hash_bytes(&content))
}

/// Hash every file under `root`, keyed by `/`-separated relative path.
///
/// A missing root yields an empty map.
pub fn hash_output_tree(
    root: &Path,
    ignore: &IgnoreRules,
) -> anyhow::Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    if root.exists() {
        hash_dir_recursive(&mut hashes, root, "", ignore)?;
    }
    Ok(hashes)
}

fn hash_dir_recursive(
    hashes: &mut BTreeMap<String, String>,
    dir: &Path,
    base: &str,
    ignore: &IgnoreRules,
) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut sorted_entries: Vec<_> = entries
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    sorted_entries.sort_by_key(|e| e.file_name());

    for entry in sorted_entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let rel_path = if base.is_empty() {
            name_str.to_string()
        } else {
            format!("{}/{}", base, name_str)
        };

        // Follow symlinks so a linked template hashes like a copied one.
        let metadata = fs::metadata(entry.path())
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

        if metadata.is_dir() {
            if ignore.ignores_dir(&name_str) {
                continue;
            }
            hash_dir_recursive(hashes, &entry.path(), &rel_path, ignore)?;
        } else if metadata.is_file() {
            if ignore.ignores_file(&name_str) {
                continue;
            }
            hashes.insert(rel_path, hash_file(&entry.path())?);
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry type: {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}
