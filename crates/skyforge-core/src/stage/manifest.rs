//! Stage that applies plain Kubernetes manifests with the cluster client.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tracing::info;

use super::builtin::kubeconfig;
use super::{OutputMap, OutputValue, Stage, StageEnv, StageOutputs};
use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::render::{IgnoreRules, RenderedFileSet, collect_templates};
use crate::terraform::VarMap;

#[derive(Debug)]
pub struct ManifestStage {
    name: String,
    env: StageEnv,
}

impl ManifestStage {
    pub fn new(name: impl Into<String>, env: StageEnv) -> Self {
        Self {
            name: name.into(),
            env,
        }
    }

    fn directory(&self) -> String {
        format!("stages/{}", self.name)
    }

    fn manifests(&self) -> DeployResult<Vec<PathBuf>> {
        let root = self.env.output_dir().join(self.directory());
        let mut found = Vec::new();
        collect_manifests(&root, &mut found)?;
        Ok(manifest_order(found))
    }
}

fn collect_manifests(dir: &Path, found: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read manifest directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_manifests(&path, found)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        ) {
            found.push(path);
        }
    }
    Ok(())
}

/// Custom resource definitions first, then lexical path order.
pub fn manifest_order(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort_by(|a, b| {
        let a_crd = is_crd(a);
        let b_crd = is_crd(b);
        b_crd.cmp(&a_crd).then_with(|| a.cmp(b))
    });
    paths
}

fn is_crd(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase().contains("crd"))
        .unwrap_or(false)
}

impl Stage for ManifestStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self) -> anyhow::Result<RenderedFileSet> {
        match self.env.template_dir(&self.name) {
            Some(source) => collect_templates(&source, &self.directory(), &IgnoreRules::default()),
            None => Ok(RenderedFileSet::new()),
        }
    }

    fn input_vars(&self, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        Ok(VarMap::new())
    }

    fn deploy(
        &self,
        ctx: &ExecutionContext,
        outputs: &StageOutputs,
        _vars: &VarMap,
    ) -> DeployResult<OutputMap> {
        let kubeconfig = kubeconfig(outputs)?;
        let manifests = self.manifests()?;
        for manifest in &manifests {
            self.env.cluster.apply_manifest(ctx, &kubeconfig, manifest)?;
        }
        info!(stage = %self.name, count = manifests.len(), "manifests applied");

        let applied: Vec<Value> = manifests
            .iter()
            .map(|m| Value::String(m.display().to_string()))
            .collect();
        Ok(OutputMap::from([(
            "manifests".to_string(),
            OutputValue::plain(applied),
        )]))
    }

    fn refresh(&self, _ctx: &ExecutionContext, _outputs: &StageOutputs) -> DeployResult<OutputMap> {
        Ok(OutputMap::new())
    }

    fn destroy(&self, ctx: &ExecutionContext, outputs: &StageOutputs) -> DeployResult<()> {
        let kubeconfig = kubeconfig(outputs)?;
        for manifest in self.manifests()?.iter().rev() {
            self.env.cluster.delete_manifest(ctx, &kubeconfig, manifest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crds_sort_before_other_manifests() {
        let ordered = manifest_order(vec![
            PathBuf::from("b/deployment.yaml"),
            PathBuf::from("a/service.yaml"),
            PathBuf::from("z/kuberhealthy-crd.yaml"),
        ]);
        assert_eq!(
            ordered,
            vec![
                PathBuf::from("z/kuberhealthy-crd.yaml"),
                PathBuf::from("a/service.yaml"),
                PathBuf::from("b/deployment.yaml"),
            ]
        );
    }
}
