use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CloudProvider, ProjectIdentity, pool_label_selectors};
use crate::config::{AwsConfig, KeyValue, ProviderKind};
use crate::credentials::ExecutionContext;
use crate::error::DeployResult;
use crate::stage::{INFRASTRUCTURE_STAGE, STATE_STAGE};
use crate::terraform::objects::{self, Backend};
use crate::terraform::{StateImport, VarMap};

#[derive(Debug, Clone)]
pub struct AwsProvider {
    identity: ProjectIdentity,
    settings: AwsConfig,
}

impl AwsProvider {
    pub fn new(identity: ProjectIdentity, settings: AwsConfig) -> Self {
        Self { identity, settings }
    }

    fn lock_table(&self) -> String {
        format!("{}-terraform-state-lock", self.identity.prefix())
    }

    fn eks_data_objects(&self) -> Vec<Value> {
        let cluster = self.identity.prefix();
        vec![
            objects::data("aws_eks_cluster", "default", json!({"name": cluster})),
            objects::data("aws_eks_cluster_auth", "default", json!({"name": cluster})),
        ]
    }
}

const EKS_HOST: &str = "${data.aws_eks_cluster.default.endpoint}";
const EKS_CA: &str =
    "${base64decode(data.aws_eks_cluster.default.certificate_authority[0].data)}";
const EKS_TOKEN: &str = "${data.aws_eks_cluster_auth.default.token}";

impl CloudProvider for AwsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn input_vars(&self, stage: &str) -> DeployResult<VarMap> {
        match stage {
            STATE_STAGE => Ok(self.identity.base_vars()),
            INFRASTRUCTURE_STAGE => {
                let node_groups: Vec<Value> = self
                    .settings
                    .node_groups
                    .iter()
                    .map(|(name, group)| {
                        json!({
                            "name": name,
                            "instance_type": group.instance,
                            "gpu": group.gpu,
                            "min_size": group.min_nodes,
                            "desired_size": group.min_nodes.max(1),
                            "max_size": group.max_nodes,
                            "permissions_boundary": self.settings.permissions_boundary,
                        })
                    })
                    .collect();
                Ok(VarMap::from_iter([
                    ("name".to_string(), json!(self.identity.project_name)),
                    ("environment".to_string(), json!(self.identity.namespace)),
                    ("region".to_string(), json!(self.settings.region)),
                    (
                        "kubernetes_version".to_string(),
                        json!(self.settings.kubernetes_version),
                    ),
                    ("node_groups".to_string(), Value::Array(node_groups)),
                    (
                        "availability_zones".to_string(),
                        json!(self.settings.availability_zones),
                    ),
                    (
                        "permissions_boundary".to_string(),
                        json!(self.settings.permissions_boundary),
                    ),
                ]))
            }
            _ => Ok(VarMap::new()),
        }
    }

    fn state_backend(&self, directory: &str) -> Option<Backend> {
        let prefix = self.identity.prefix();
        Some(
            Backend::new("s3")
                .with("bucket", self.identity.state_bucket())
                .with("key", format!("terraform/{prefix}/{directory}.tfstate"))
                .with("region", self.settings.region.clone())
                .with("encrypt", true)
                .with("dynamodb_table", self.lock_table()),
        )
    }

    fn node_group_selectors(&self) -> BTreeMap<String, KeyValue> {
        pool_label_selectors("eks.amazonaws.com/nodegroup")
    }

    fn state_imports(&self, _ctx: &ExecutionContext) -> DeployResult<Vec<StateImport>> {
        Ok(vec![
            StateImport::new(
                "module.terraform-state.aws_s3_bucket.terraform-state",
                self.identity.state_bucket(),
            ),
            StateImport::new(
                "module.terraform-state.aws_dynamodb_table.terraform-state-lock",
                self.lock_table(),
            ),
        ])
    }

    fn cloud_objects(&self) -> Vec<Value> {
        vec![objects::provider(
            "aws",
            json!({"region": self.settings.region}),
        )]
    }

    fn kubernetes_objects(&self) -> Vec<Value> {
        let mut blocks = self.eks_data_objects();
        blocks.extend(self.cloud_objects());
        blocks.push(objects::provider(
            "kubernetes",
            json!({
                "experiments": {"manifest_resource": true},
                "host": EKS_HOST,
                "cluster_ca_certificate": EKS_CA,
                "token": EKS_TOKEN,
            }),
        ));
        blocks.push(objects::provider(
            "helm",
            json!({
                "kubernetes": {
                    "host": EKS_HOST,
                    "cluster_ca_certificate": EKS_CA,
                    "token": EKS_TOKEN,
                }
            }),
        ));
        blocks
    }
}
