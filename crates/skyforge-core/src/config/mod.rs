//! Deployment configuration and tool settings
//!
//! - `skyforge-config.yaml`: the deployment document, one per project
//! - `settings.toml`: per-machine tool settings

pub mod parser;
pub mod schema;
pub mod settings;
pub mod store;

pub use parser::{parse_config, parse_config_str, parse_config_with, parse_document, to_yaml};
pub use schema::{
    AwsConfig, AzureConfig, CertificateConfig, CiCdConfig, CiCdKind, DigitalOceanConfig,
    GcpConfig, KeyValue, KeycloakSettings, LocalConfig, NodeGroup, ProviderConfig, ProviderKind,
    SecurityConfig, SkyforgeConfig, TerraformStateConfig,
};
pub use settings::{CheckSettings, Settings};
pub use store::{CONFIG_FILENAME, ConfigStore};
