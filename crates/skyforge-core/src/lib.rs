//! Skyforge Core Library
//!
//! Drives a platform deployment through an ordered list of stages: render
//! the files each stage needs, apply them with Terraform or kubectl, verify
//! the result, and tear everything down again in reverse.

pub mod check;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod provider;
pub mod render;
pub mod retry;
pub mod stage;
pub mod terraform;
pub mod upgrade;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, ProviderKind, Settings, SkyforgeConfig};

    // Errors
    pub use crate::error::{DeployError, DeployResult};

    // Credentials
    pub use crate::credentials::{CredentialScope, ExecutionContext};

    // Stages
    pub use crate::stage::{Stage, StageEnv, StageOutputs, platform_stages};

    // Pipeline
    pub use crate::pipeline::{
        DeployOptions, DestroyOptions, DestroyReport, RenderOptions, RenderReport, render_project,
        run_deploy, run_destroy,
    };

    // Upgrade
    pub use crate::upgrade::{MIGRATIONS, RELEASE_VERSION, UpgradeStatus, upgrade_config_file};
}
