//! Output paths written by earlier releases that a render must remove.

/// Relative to the output directory. Directories are removed recursively.
pub const LEGACY_PATHS: &[&str] = &[
    "infrastructure",
    "terraform-state",
    ".github/workflows/image-pr.yaml",
    ".github/workflows/image.yaml",
    ".github/workflows/jupyterhub-pr.yaml",
    ".github/workflows/jupyterhub.yaml",
    "stages/07-kubernetes-services/modules/kubernetes/services/dask-gateway/controler.tf",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::normalize_relative;
    use std::path::Path;

    #[test]
    fn legacy_paths_are_normalized_relative_paths() {
        for path in LEGACY_PATHS {
            let normalized = normalize_relative(Path::new(path)).unwrap();
            assert_eq!(&normalized, path);
        }
    }
}
