//! Cluster access through kubectl.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::process::run_streaming;
use crate::retry::{Attempt, RetryPolicy, retry};

pub trait ClusterApi: fmt::Debug + Send + Sync {
    fn list_nodes(&self, ctx: &ExecutionContext, kubeconfig: &Path) -> anyhow::Result<Vec<String>>;

    fn list_namespaces(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
    ) -> anyhow::Result<Vec<String>>;

    fn apply_manifest(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
        manifest: &Path,
    ) -> DeployResult<()>;

    /// Delete what `manifest` describes; already-absent objects are fine.
    fn delete_manifest(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
        manifest: &Path,
    ) -> DeployResult<()>;
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    /// Bound on each API request, so one check attempt cannot hang.
    request_timeout: Duration,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            request_timeout,
        }
    }

    fn command(&self, ctx: &ExecutionContext, kubeconfig: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--kubeconfig")
            .arg(kubeconfig)
            .arg(format!("--request-timeout={}s", self.request_timeout.as_secs().max(1)));
        ctx.apply_to(&mut command);
        command
    }

    fn list(&self, ctx: &ExecutionContext, kubeconfig: &Path, kind: &str) -> anyhow::Result<Vec<String>> {
        let output = self
            .command(ctx, kubeconfig)
            .args(["get", kind, "-o", "json"])
            .output()
            .with_context(|| format!("Failed to run {} get {}", self.binary, kind))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} get {} failed: {}",
                self.binary,
                kind,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        names_from_list(&output.stdout)
    }

    fn run_manifest(
        &self,
        verb: &str,
        extra: &[&str],
        ctx: &ExecutionContext,
        kubeconfig: &Path,
        manifest: &Path,
    ) -> DeployResult<()> {
        let mut command = self.command(ctx, kubeconfig);
        command.arg(verb).args(extra).arg("-f").arg(manifest);
        let started = Instant::now();
        let output = run_streaming(&mut command, "kubectl", None)
            .with_context(|| format!("Failed to run {} {}", self.binary, verb))?;
        info!(
            manifest = %manifest.display(),
            "kubectl {verb} took {:.3} [s]",
            started.elapsed().as_secs_f64()
        );
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::tool(&self.binary, verb, output.code(), manifest))
        }
    }
}

impl ClusterApi for Kubectl {
    fn list_nodes(&self, ctx: &ExecutionContext, kubeconfig: &Path) -> anyhow::Result<Vec<String>> {
        self.list(ctx, kubeconfig, "nodes")
    }

    fn list_namespaces(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
    ) -> anyhow::Result<Vec<String>> {
        self.list(ctx, kubeconfig, "namespaces")
    }

    fn apply_manifest(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
        manifest: &Path,
    ) -> DeployResult<()> {
        self.run_manifest("apply", &[], ctx, kubeconfig, manifest)
    }

    fn delete_manifest(
        &self,
        ctx: &ExecutionContext,
        kubeconfig: &Path,
        manifest: &Path,
    ) -> DeployResult<()> {
        self.run_manifest("delete", &["--ignore-not-found"], ctx, kubeconfig, manifest)
    }
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
}

#[derive(Deserialize)]
struct ObjectItem {
    metadata: ObjectMeta,
}

#[derive(Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Names from `kubectl get <kind> -o json`.
pub fn names_from_list(json: &[u8]) -> anyhow::Result<Vec<String>> {
    let list: ObjectList =
        serde_json::from_slice(json).context("Failed to parse kubectl list output")?;
    Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
}

/// The cluster reports at least one node.
pub fn check_nodes_ready(
    stage: &str,
    cluster: &dyn ClusterApi,
    ctx: &ExecutionContext,
    kubeconfig: &Path,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    let nodes = retry(policy, |_| match cluster.list_nodes(ctx, kubeconfig) {
        Ok(nodes) if !nodes.is_empty() => Attempt::Success(nodes),
        Ok(_) => Attempt::Retry("cluster has no nodes yet".to_string()),
        Err(e) => Attempt::Retry(format!("unable to reach cluster: {e:#}")),
    })
    .into_validation(stage, "kubernetes nodes")?;
    info!(stage, count = nodes.len(), "kubernetes cluster reachable");
    Ok(())
}

/// `namespace` exists in the cluster.
pub fn check_namespace_exists(
    stage: &str,
    cluster: &dyn ClusterApi,
    ctx: &ExecutionContext,
    kubeconfig: &Path,
    namespace: &str,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    retry(policy, |_| match cluster.list_namespaces(ctx, kubeconfig) {
        Ok(names) if names.iter().any(|n| n == namespace) => Attempt::Success(()),
        Ok(_) => Attempt::Retry(format!("namespace {namespace} not found")),
        Err(e) => Attempt::Retry(format!("unable to list namespaces: {e:#}")),
    })
    .into_validation(stage, &format!("namespace/{namespace}"))?;
    info!(stage, namespace, "namespace exists");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct ScriptedCluster {
        namespaces: Mutex<Vec<Vec<String>>>,
    }

    impl ClusterApi for ScriptedCluster {
        fn list_nodes(&self, _: &ExecutionContext, _: &Path) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }

        fn list_namespaces(&self, _: &ExecutionContext, _: &Path) -> anyhow::Result<Vec<String>> {
            let mut script = self.namespaces.lock().unwrap();
            if script.is_empty() {
                anyhow::bail!("connection refused");
            }
            Ok(script.remove(0))
        }

        fn apply_manifest(&self, _: &ExecutionContext, _: &Path, _: &Path) -> DeployResult<()> {
            Ok(())
        }

        fn delete_manifest(&self, _: &ExecutionContext, _: &Path, _: &Path) -> DeployResult<()> {
            Ok(())
        }
    }

    fn immediate(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::ZERO)
    }

    #[test]
    fn parses_names_from_kubectl_json() {
        let json = br#"{"apiVersion":"v1","items":[{"metadata":{"name":"default"}},{"metadata":{"name":"dev"}}],"kind":"List"}"#;
        assert_eq!(names_from_list(json).unwrap(), vec!["default", "dev"]);
    }

    #[test]
    fn namespace_appearing_later_passes() {
        let cluster = ScriptedCluster {
            namespaces: Mutex::new(vec![
                vec!["default".to_string()],
                vec!["default".to_string(), "dev".to_string()],
            ]),
        };

        check_namespace_exists(
            "03-kubernetes-initialize",
            &cluster,
            &ExecutionContext::new(),
            Path::new("/tmp/kubeconfig"),
            "dev",
            &immediate(3),
        )
        .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn list_passes_a_request_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let script = tmp.path().join("kubectl");
        std::fs::write(&script, "#!/bin/sh\necho \"$@\" 1>&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let kubectl = Kubectl::new(script.to_string_lossy(), Duration::from_secs(7));

        let err = kubectl
            .list_nodes(&ExecutionContext::new(), Path::new("/tmp/kubeconfig"))
            .unwrap_err();

        assert!(format!("{err:#}").contains("--request-timeout=7s"), "{err:#}");
    }

    #[test]
    fn empty_cluster_fails_node_check() {
        let err = check_nodes_ready(
            "02-infrastructure",
            &ScriptedCluster::default(),
            &ExecutionContext::new(),
            Path::new("/tmp/kubeconfig"),
            &immediate(2),
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::Validation { .. }));
    }
}
