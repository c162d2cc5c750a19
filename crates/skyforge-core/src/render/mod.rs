//! Render reconciliation: desired files, diffing against an output
//! directory, and applying the difference.

pub mod apply;
pub mod cicd;
pub mod diff;
pub mod hash;
pub mod legacy;
pub mod templates;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

pub use apply::{ApplyReport, apply, resolve_within};
pub use diff::{FileDiff, diff};
pub use hash::IgnoreRules;
pub use legacy::LEGACY_PATHS;
pub use templates::collect_templates;

/// Where the bytes of a rendered file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Byte-for-byte copy of a template file.
    Copy(PathBuf),
    /// Content produced during render.
    Generated(Vec<u8>),
}

/// Relative output path to file source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedFileSet {
    files: BTreeMap<String, FileSource>,
}

impl RenderedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_generated(
        &mut self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let key = normalize_relative(path.as_ref())?;
        self.files.insert(key, FileSource::Generated(content.into()));
        Ok(())
    }

    pub fn insert_copy(
        &mut self,
        path: impl AsRef<Path>,
        source: impl Into<PathBuf>,
    ) -> anyhow::Result<()> {
        let key = normalize_relative(path.as_ref())?;
        self.files.insert(key, FileSource::Copy(source.into()));
        Ok(())
    }

    /// Merge `other` into `self`; later entries win on path collisions.
    pub fn extend(&mut self, other: RenderedFileSet) {
        self.files.extend(other.files);
    }

    pub fn get(&self, path: &str) -> Option<&FileSource> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileSource)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes of a rendered file, reading copy sources from disk.
    pub fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        match self.files.get(path) {
            Some(FileSource::Generated(bytes)) => Ok(bytes.clone()),
            Some(FileSource::Copy(source)) => std::fs::read(source)
                .with_context(|| format!("Failed to read template file: {}", source.display())),
            None => anyhow::bail!("Path is not part of the rendered set: {}", path),
        }
    }

    /// Content hash of every rendered path.
    pub fn content_hashes(&self) -> anyhow::Result<BTreeMap<String, String>> {
        self.files
            .iter()
            .map(|(path, source)| {
                let digest = match source {
                    FileSource::Generated(bytes) => hash::hash_bytes(bytes),
                    FileSource::Copy(src) => hash::hash_file(src)?,
                };
                Ok((path.clone(), digest))
            })
            .collect()
    }
}

/// Normalise a rendered path to a `/`-separated relative key.
///
/// Absolute paths and `..` components are rejected.
pub fn normalize_relative(path: &Path) -> anyhow::Result<String> {
    if path.is_absolute() {
        anyhow::bail!("Absolute paths not allowed in rendered output: {}", path.display());
    }
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                anyhow::bail!("Path traversal not allowed in rendered output: {}", path.display())
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("Absolute paths not allowed in rendered output: {}", path.display())
            }
        }
    }
    if parts.is_empty() {
        anyhow::bail!("Empty path not allowed in rendered output");
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_current_dir_prefix() {
        assert_eq!(
            normalize_relative(Path::new("./stages/01/main.tf")).unwrap(),
            "stages/01/main.tf"
        );
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(normalize_relative(Path::new("../etc/passwd")).is_err());
        assert!(normalize_relative(Path::new("a/../../b")).is_err());
        assert!(normalize_relative(Path::new("/etc/passwd")).is_err());
        assert!(normalize_relative(Path::new("")).is_err());
    }

    #[test]
    fn extend_prefers_later_entries() {
        let mut a = RenderedFileSet::new();
        a.insert_generated("x.txt", "first").unwrap();
        let mut b = RenderedFileSet::new();
        b.insert_generated("x.txt", "second").unwrap();
        a.extend(b);

        assert_eq!(a.len(), 1);
        assert_eq!(a.read("x.txt").unwrap(), b"second");
    }
}
