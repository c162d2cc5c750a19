//! Shared handles every built-in stage needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::check::{ClusterApi, IdentityProviderApi, KeycloakAdmin, Kubectl, http_client};
use crate::config::{Settings, SkyforgeConfig};
use crate::error::DeployResult;
use crate::provider::{self, CloudProvider};
use crate::retry::RetryPolicy;
use crate::terraform::{InfraTool, TerraformCli};

#[derive(Debug, Clone)]
pub struct StageEnv {
    pub config: Arc<SkyforgeConfig>,
    pub settings: Arc<Settings>,
    pub provider: Arc<dyn CloudProvider>,
    pub tool: Arc<dyn InfraTool>,
    pub cluster: Arc<dyn ClusterApi>,
    pub identity: Arc<dyn IdentityProviderApi>,
    pub http: reqwest::blocking::Client,
    pub output_dir: PathBuf,
}

impl StageEnv {
    /// Production wiring: terraform, kubectl and HTTP clients from `settings`.
    pub fn new(
        config: SkyforgeConfig,
        settings: Settings,
        output_dir: impl Into<PathBuf>,
    ) -> DeployResult<Self> {
        let http = http_client(settings.accept_invalid_certs)?;
        let tool = TerraformCli::new(settings.terraform_binary.clone(), settings.import_timeout());
        let cluster = Kubectl::new(settings.kubectl_binary.clone(), settings.kubectl_timeout());
        Ok(Self {
            provider: provider::for_config(&config),
            config: Arc::new(config),
            tool: Arc::new(tool),
            cluster: Arc::new(cluster),
            identity: Arc::new(KeycloakAdmin::new(http.clone())),
            http,
            settings: Arc::new(settings),
            output_dir: output_dir.into(),
        })
    }

    pub fn with_tool(mut self, tool: Arc<dyn InfraTool>) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterApi>) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProviderApi>) -> Self {
        self.identity = identity;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Template tree for a stage, if a template root is configured.
    pub fn template_dir(&self, relative: &str) -> Option<PathBuf> {
        self.settings
            .template_root
            .as_ref()
            .map(|root| root.join(relative))
    }

    pub fn check_policy(&self) -> RetryPolicy {
        self.settings.checks.policy()
    }

    pub fn slow_check_policy(&self) -> RetryPolicy {
        self.settings.checks.slow_policy()
    }
}
