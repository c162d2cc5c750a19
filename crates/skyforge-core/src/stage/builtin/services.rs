//! `07-kubernetes-services`: the user-facing platform services.

use serde_json::{Value, json};

use super::keycloak::REALM_ID;
use super::{cluster_vars, endpoint, node_groups_var};
use crate::check::check_http_health;
use crate::credentials::ExecutionContext;
use crate::error::{DeployError, DeployResult};
use crate::stage::{SERVICES_STAGE, StageEnv, StageOutputs, TerraformModule};
use crate::terraform::VarMap;

#[derive(Debug, Clone, Copy)]
pub struct ServicesModule;

/// `(service, health_url)` for every entry of the `service_urls` output.
pub fn health_urls(outputs: &StageOutputs) -> DeployResult<Vec<(String, String)>> {
    outputs
        .object_value(SERVICES_STAGE, "service_urls")?
        .iter()
        .map(|(name, entry)| {
            entry
                .get("health_url")
                .and_then(Value::as_str)
                .map(|url| (name.clone(), url.to_string()))
                .ok_or_else(|| {
                    DeployError::missing_output(SERVICES_STAGE, format!("service_urls.{name}.health_url"))
                })
        })
        .collect()
}

impl TerraformModule for ServicesModule {
    fn name(&self) -> &'static str {
        SERVICES_STAGE
    }

    fn input_vars(&self, env: &StageEnv, outputs: &StageOutputs) -> DeployResult<VarMap> {
        let mut vars = cluster_vars(env);
        vars.insert("endpoint".to_string(), json!(endpoint(env, outputs)?));
        vars.insert("realm_id".to_string(), json!(REALM_ID));
        vars.insert("node_groups".to_string(), node_groups_var(env));
        vars.insert("default_images".to_string(), json!(env.config.default_images));
        vars.insert(
            "shared_users_group".to_string(),
            json!(env.config.security.shared_users_group),
        );
        Ok(vars)
    }

    fn check(
        &self,
        env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        for (_, url) in health_urls(outputs)? {
            check_http_health(SERVICES_STAGE, &env.http, &url, &env.check_policy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{OutputMap, OutputValue};

    #[test]
    fn collects_health_urls_per_service() {
        let mut outputs = StageOutputs::new();
        outputs.record(
            SERVICES_STAGE,
            OutputMap::from([(
                "service_urls".to_string(),
                OutputValue::plain(json!({
                    "jupyterhub": {"url": "https://x/hub/", "health_url": "https://x/hub/api/"},
                    "monitoring": {"url": "https://x/monitoring/", "health_url": "https://x/monitoring/api/health"},
                })),
            )]),
        );

        let urls = health_urls(&outputs).unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], ("jupyterhub".to_string(), "https://x/hub/api/".to_string()));
    }

    #[test]
    fn entry_without_health_url_is_missing_output() {
        let mut outputs = StageOutputs::new();
        outputs.record(
            SERVICES_STAGE,
            OutputMap::from([(
                "service_urls".to_string(),
                OutputValue::plain(json!({"dask": {"url": "https://x/gateway/"}})),
            )]),
        );
        assert!(matches!(
            health_urls(&outputs),
            Err(DeployError::MissingOutput { .. })
        ));
    }
}
