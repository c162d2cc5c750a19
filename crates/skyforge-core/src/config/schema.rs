//! Configuration schema for skyforge-config.yaml
//!
//! The provider block is a tagged union keyed by the top-level `provider:`
//! field, so a document can only ever carry the settings of the provider it
//! selects.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// Root of the deployment document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyforgeConfig {
    pub project_name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Public domain of the deployment; the ingress address is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Version of the tool the document was last written for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Set by upgrade steps that require manual acknowledgement.
    #[serde(default, skip_serializing_if = "is_false")]
    pub prevent_deploy: bool,

    #[serde(flatten)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub terraform_state: TerraformStateConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_cd: Option<CiCdConfig>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub default_images: BTreeMap<String, String>,

    #[serde(default)]
    pub certificate: CertificateConfig,
}

fn default_namespace() -> String {
    "dev".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    Local,
    DigitalOcean,
    Gcp,
    Azure,
    Aws,
}

impl ProviderKind {
    /// Value of the `provider:` field, also used as a stage sub-directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::DigitalOcean => "do",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
            ProviderKind::Aws => "aws",
        }
    }

    pub fn is_cloud(&self) -> bool {
        !matches!(self, ProviderKind::Local)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum ProviderConfig {
    #[serde(rename = "local")]
    Local {
        #[serde(default)]
        local: LocalConfig,
    },
    #[serde(rename = "do")]
    DigitalOcean { digital_ocean: DigitalOceanConfig },
    #[serde(rename = "gcp")]
    Gcp { google_cloud_platform: GcpConfig },
    #[serde(rename = "azure")]
    Azure { azure: AzureConfig },
    #[serde(rename = "aws")]
    Aws { amazon_web_services: AwsConfig },
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Local { .. } => ProviderKind::Local,
            ProviderConfig::DigitalOcean { .. } => ProviderKind::DigitalOcean,
            ProviderConfig::Gcp { .. } => ProviderKind::Gcp,
            ProviderConfig::Azure { .. } => ProviderKind::Azure,
            ProviderConfig::Aws { .. } => ProviderKind::Aws,
        }
    }

    /// Node groups of a cloud provider; empty for local clusters.
    pub fn node_groups(&self) -> BTreeMap<String, NodeGroup> {
        match self {
            ProviderConfig::Local { .. } => BTreeMap::new(),
            ProviderConfig::DigitalOcean { digital_ocean } => digital_ocean.node_groups.clone(),
            ProviderConfig::Gcp {
                google_cloud_platform,
            } => google_cloud_platform.node_groups.clone(),
            ProviderConfig::Azure { azure } => azure.node_groups.clone(),
            ProviderConfig::Aws {
                amazon_web_services,
            } => amazon_web_services.node_groups.clone(),
        }
    }

    pub fn kubernetes_version(&self) -> Option<&str> {
        match self {
            ProviderConfig::Local { .. } => None,
            ProviderConfig::DigitalOcean { digital_ocean } => {
                Some(&digital_ocean.kubernetes_version)
            }
            ProviderConfig::Gcp {
                google_cloud_platform,
            } => Some(&google_cloud_platform.kubernetes_version),
            ProviderConfig::Azure { azure } => Some(&azure.kubernetes_version),
            ProviderConfig::Aws {
                amazon_web_services,
            } => Some(&amazon_web_services.kubernetes_version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// kubeconfig context to deploy into; the current context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    #[serde(default = "default_local_selectors")]
    pub node_selectors: BTreeMap<String, KeyValue>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            kube_context: None,
            node_selectors: default_local_selectors(),
        }
    }
}

fn default_local_selectors() -> BTreeMap<String, KeyValue> {
    ["general", "user", "worker"]
        .into_iter()
        .map(|group| {
            (
                group.to_string(),
                KeyValue {
                    key: "kubernetes.io/os".to_string(),
                    value: "linux".to_string(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub instance: String,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub gpu: bool,
}

fn default_max_nodes() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalOceanConfig {
    pub region: String,
    pub kubernetes_version: String,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project: String,
    pub region: String,
    pub kubernetes_version: String,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureConfig {
    pub region: String,
    pub kubernetes_version: String,
    /// Suffix keeping the state storage account name globally unique.
    pub storage_account_postfix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub kubernetes_version: String,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions_boundary: Option<String>,
}

/// Where stage state lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TerraformStateConfig {
    /// Provider-managed bucket created by the state stage.
    #[default]
    Remote,
    /// State files next to each stage.
    Local,
    /// A backend the user already operates, passed through verbatim.
    Existing {
        backend: String,
        #[serde(default)]
        config: BTreeMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CiCdKind {
    GithubActions,
    GitlabCi,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiCdConfig {
    #[serde(rename = "type")]
    pub kind: CiCdKind,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_true")]
    pub commit_render: bool,
    #[serde(default)]
    pub before_script: Vec<String>,
    #[serde(default)]
    pub after_script: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub keycloak: KeycloakSettings,
    #[serde(default = "default_true")]
    pub shared_users_group: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            keycloak: KeycloakSettings::default(),
            shared_users_group: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeycloakSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_root_password: Option<String>,
    #[serde(default = "default_realm_display_name")]
    pub realm_display_name: String,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            initial_root_password: None,
            realm_display_name: default_realm_display_name(),
        }
    }
}

fn default_realm_display_name() -> String {
    "Skyforge".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CertificateConfig {
    #[default]
    SelfSigned,
    LetsEncrypt {
        acme_email: String,
        #[serde(default = "default_acme_server")]
        acme_server: String,
    },
    Existing {
        secret_name: String,
    },
}

fn default_acme_server() -> String {
    "https://acme-v02.api.letsencrypt.org/directory".to_string()
}

impl SkyforgeConfig {
    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// `<project_name>-<namespace>`, the prefix of every cloud resource.
    pub fn resource_prefix(&self) -> String {
        format!("{}-{}", self.project_name, self.namespace)
    }

    /// Parsed `version` field, if present.
    pub fn parsed_version(&self) -> DeployResult<Option<semver::Version>> {
        self.version
            .as_deref()
            .map(|v| {
                semver::Version::parse(v).map_err(|e| {
                    DeployError::Config(format!("version {v:?} is not a valid version: {e}"))
                })
            })
            .transpose()
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> DeployResult<()> {
        let project = Regex::new(r"^[A-Za-z][A-Za-z0-9\-_]{1,30}[A-Za-z0-9]$")
            .map_err(|e| DeployError::Invariant(e.to_string()))?;
        if !project.is_match(&self.project_name) {
            return Err(DeployError::Config(format!(
                "project_name {:?} must start with a letter, end with a letter or digit, \
                 contain only letters, digits, '-' or '_', and be 3 to 32 characters long",
                self.project_name
            )));
        }

        let namespace = Regex::new(r"^[A-Za-z][A-Za-z\-_]*[A-Za-z]$")
            .map_err(|e| DeployError::Invariant(e.to_string()))?;
        if !namespace.is_match(&self.namespace) {
            return Err(DeployError::Config(format!(
                "namespace {:?} must start and end with a letter and contain only letters, '-' or '_'",
                self.namespace
            )));
        }

        if self.provider_kind() == ProviderKind::Azure {
            let escaped_len = self.project_name.replace(['-', '_'], "").len();
            if escaped_len + self.namespace.len() > 16 {
                return Err(DeployError::Config(
                    "on azure, project_name without '-' and '_' plus namespace must be at most \
                     16 characters to fit the state storage account name"
                        .to_string(),
                ));
            }
        }

        let node_groups = self.provider.node_groups();
        if self.provider_kind().is_cloud() && node_groups.is_empty() {
            return Err(DeployError::Config(format!(
                "provider {} requires at least one node group",
                self.provider_kind()
            )));
        }
        for (name, group) in &node_groups {
            if group.min_nodes > group.max_nodes {
                return Err(DeployError::Config(format!(
                    "node group {name}: min_nodes ({}) is greater than max_nodes ({})",
                    group.min_nodes, group.max_nodes
                )));
            }
        }

        self.parsed_version()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws_document() -> &'static str {
        r#"
project_name: demo
namespace: dev
provider: aws
amazon_web_services:
  region: us-east-1
  kubernetes_version: "1.29"
  node_groups:
    general:
      instance: m5.2xlarge
      min_nodes: 1
      max_nodes: 1
"#
    }

    #[test]
    fn provider_block_is_selected_by_tag() {
        let config: SkyforgeConfig = serde_yaml::from_str(aws_document()).unwrap();
        assert_eq!(config.provider_kind(), ProviderKind::Aws);
        match &config.provider {
            ProviderConfig::Aws {
                amazon_web_services,
            } => assert_eq!(amazon_web_services.region, "us-east-1"),
            other => panic!("unexpected provider {other:?}"),
        }
        assert_eq!(config.terraform_state, TerraformStateConfig::Remote);
        assert_eq!(config.certificate, CertificateConfig::SelfSigned);
        assert!(config.security.shared_users_group);
    }

    #[test]
    fn local_provider_needs_no_block() {
        let config: SkyforgeConfig =
            serde_yaml::from_str("project_name: demo\nprovider: local\n").unwrap();
        assert_eq!(config.namespace, "dev");
        assert_eq!(config.provider_kind(), ProviderKind::Local);
        config.validate().unwrap();
    }

    #[test]
    fn missing_provider_block_is_rejected() {
        let result: Result<SkyforgeConfig, _> =
            serde_yaml::from_str("project_name: demo\nprovider: gcp\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_project_name_is_config_error() {
        let mut config: SkyforgeConfig = serde_yaml::from_str(aws_document()).unwrap();
        config.project_name = "9lives".to_string();
        assert!(matches!(config.validate(), Err(DeployError::Config(_))));
    }

    #[test]
    fn inverted_node_group_bounds_are_rejected() {
        let mut config: SkyforgeConfig = serde_yaml::from_str(aws_document()).unwrap();
        if let ProviderConfig::Aws {
            amazon_web_services,
        } = &mut config.provider
        {
            amazon_web_services
                .node_groups
                .get_mut("general")
                .unwrap()
                .min_nodes = 3;
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_nodes"));
    }

    #[test]
    fn existing_state_backend_carries_raw_settings() {
        let doc = format!(
            "{}terraform_state:\n  type: existing\n  backend: s3\n  config:\n    bucket: mine\n",
            aws_document()
        );
        let config: SkyforgeConfig = serde_yaml::from_str(&doc).unwrap();
        match config.terraform_state {
            TerraformStateConfig::Existing { backend, config } => {
                assert_eq!(backend, "s3");
                assert_eq!(config["bucket"], serde_json::json!("mine"));
            }
            other => panic!("unexpected state config {other:?}"),
        }
    }

    #[test]
    fn bad_version_field_is_config_error() {
        let mut config: SkyforgeConfig = serde_yaml::from_str(aws_document()).unwrap();
        config.version = Some("2024.x".to_string());
        assert!(matches!(config.validate(), Err(DeployError::Config(_))));
    }
}
