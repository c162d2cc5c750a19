//! Error kinds surfaced by the deployment engine.
//!
//! Three kinds matter to callers:
//! - [`DeployError::Tool`]: an external subprocess exited non-zero.
//! - [`DeployError::Validation`]: a post-deploy check failed after all retries.
//! - [`DeployError::Invariant`]: an internal guarantee was violated. Never
//!   downgraded, not even during best-effort destroy.

use std::path::PathBuf;

use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{tool} {verb} failed in {} (exit status {status})", directory.display())]
    Tool {
        tool: String,
        verb: String,
        status: i32,
        directory: PathBuf,
    },

    #[error("After stage={stage} check failed for {resource}: {detail}")]
    Validation {
        stage: String,
        resource: String,
        detail: String,
    },

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error(
        "Deployment prevented due to the prevent_deploy setting in the configuration file. \
         It was set during an upgrade because redeploying this version may tear down existing \
         infrastructure. Back up your data and remove the field only once you understand why it was set."
    )]
    DeployPrevented,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Stage {stage} did not produce output {key}")]
    MissingOutput { stage: String, key: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeployError {
    pub fn tool(tool: &str, verb: &str, status: i32, directory: impl Into<PathBuf>) -> Self {
        Self::Tool {
            tool: tool.to_string(),
            verb: verb.to_string(),
            status,
            directory: directory.into(),
        }
    }

    pub fn validation(
        stage: impl Into<String>,
        resource: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Validation {
            stage: stage.into(),
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    pub fn missing_output(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingOutput {
            stage: stage.into(),
            key: key.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether best-effort destroy must stop instead of recording the failure.
    pub fn is_fatal_during_destroy(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Tool { .. } | Self::Io { .. } | Self::MissingOutput { .. } | Self::Other(_) => 1,
            Self::Validation { .. } => 2,
            Self::DeployPrevented => 3,
            Self::Config(_) => 4,
            Self::Invariant(_) => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invariant_errors_abort_destroy() {
        assert!(DeployError::Invariant("x".into()).is_fatal_during_destroy());
        assert!(!DeployError::tool("terraform", "destroy", 1, "/tmp").is_fatal_during_destroy());
        assert!(!DeployError::validation("02-infrastructure", "nodes", "none").is_fatal_during_destroy());
    }

    #[test]
    fn exit_codes_are_non_zero_and_distinct_per_kind() {
        let codes = [
            DeployError::tool("terraform", "apply", 1, "/tmp").exit_code(),
            DeployError::validation("s", "r", "d").exit_code(),
            DeployError::DeployPrevented.exit_code(),
            DeployError::Config("bad".into()).exit_code(),
            DeployError::Invariant("bad".into()).exit_code(),
        ];
        assert!(codes.iter().all(|c| *c != 0));
        assert_eq!(codes, [1, 2, 3, 4, 70]);
    }

    #[test]
    fn validation_message_names_stage_and_resource() {
        let err = DeployError::validation("04-kubernetes-ingress", "tcp://1.2.3.4:443", "refused");
        let msg = err.to_string();
        assert!(msg.contains("04-kubernetes-ingress"));
        assert!(msg.contains("tcp://1.2.3.4:443"));
    }
}
