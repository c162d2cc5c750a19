//! `04-kubernetes-ingress`: load balancer, TLS certificates and the public domain.

use serde_json::{Map, Value, json};

use super::{cluster_vars, node_groups_var};
use crate::check::{INGRESS_PORTS, check_dns, check_tcp_ports};
use crate::config::CertificateConfig;
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::stage::{INGRESS_STAGE, StageEnv, StageOutputs, TerraformModule};
use crate::terraform::VarMap;

#[derive(Debug, Clone, Copy)]
pub struct IngressModule;

/// Hostname of the load balancer, or its IP when the cloud only hands out one.
pub fn ingress_host(outputs: &StageOutputs) -> DeployResult<String> {
    let address = outputs.object_value(INGRESS_STAGE, "load_balancer_address")?;
    let pick = |key: &str| {
        address
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    pick("hostname")
        .or_else(|| pick("ip"))
        .ok_or_else(|| DeployError::missing_output(INGRESS_STAGE, "load_balancer_address.ip"))
}

fn certificate_vars(certificate: &CertificateConfig) -> Map<String, Value> {
    let mut vars = Map::new();
    match certificate {
        CertificateConfig::SelfSigned => {
            vars.insert("certificate_type".to_string(), json!("self-signed"));
        }
        CertificateConfig::LetsEncrypt {
            acme_email,
            acme_server,
        } => {
            vars.insert("certificate_type".to_string(), json!("lets-encrypt"));
            vars.insert("acme_email".to_string(), json!(acme_email));
            vars.insert("acme_server".to_string(), json!(acme_server));
        }
        CertificateConfig::Existing { secret_name } => {
            vars.insert("certificate_type".to_string(), json!("existing"));
            vars.insert("certificate_secret_name".to_string(), json!(secret_name));
        }
    }
    vars
}

impl TerraformModule for IngressModule {
    fn name(&self) -> &'static str {
        INGRESS_STAGE
    }

    fn input_vars(&self, env: &StageEnv, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        let mut vars = cluster_vars(env);
        vars.insert("node_groups".to_string(), node_groups_var(env));
        vars.insert("domain".to_string(), json!(env.config.domain));
        vars.extend(certificate_vars(&env.config.certificate));
        Ok(vars)
    }

    /// Every ingress port answers, then the domain (if any) points at the
    /// load balancer.
    fn check(
        &self,
        env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        let host = ingress_host(outputs)?;
        check_tcp_ports(INGRESS_STAGE, &host, &INGRESS_PORTS, &env.check_policy())?;
        if let Some(domain) = &env.config.domain {
            check_dns(INGRESS_STAGE, domain, &host, &env.slow_check_policy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{OutputMap, OutputValue};

    fn outputs(address: Value) -> StageOutputs {
        let mut outputs = StageOutputs::new();
        outputs.record(
            INGRESS_STAGE,
            OutputMap::from([(
                "load_balancer_address".to_string(),
                OutputValue::plain(address),
            )]),
        );
        outputs
    }

    #[test]
    fn prefers_hostname_and_falls_back_to_ip() {
        let both = outputs(json!({"hostname": "lb.example.com", "ip": "1.2.3.4"}));
        assert_eq!(ingress_host(&both).unwrap(), "lb.example.com");

        let ip_only = outputs(json!({"hostname": "", "ip": "1.2.3.4"}));
        assert_eq!(ingress_host(&ip_only).unwrap(), "1.2.3.4");

        let neither = outputs(json!({"hostname": null, "ip": null}));
        assert!(matches!(
            ingress_host(&neither),
            Err(DeployError::MissingOutput { .. })
        ));
    }

    #[test]
    fn lets_encrypt_passes_acme_settings() {
        let vars = certificate_vars(&CertificateConfig::LetsEncrypt {
            acme_email: "ops@example.com".to_string(),
            acme_server: "https://acme.test/directory".to_string(),
        });
        assert_eq!(vars["certificate_type"], "lets-encrypt");
        assert_eq!(vars["acme_email"], "ops@example.com");
        assert!(!vars.contains_key("certificate_secret_name"));
    }
}
