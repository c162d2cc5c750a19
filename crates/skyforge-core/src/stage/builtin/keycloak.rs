//! `05-kubernetes-keycloak` and `06-kubernetes-keycloak-configuration`.

use serde_json::json;

use super::{cluster_vars, endpoint};
use crate::check::{KeycloakCredentials, check_admin_access, check_realm_exists};
use crate::credentials::{CredentialScope, ExecutionContext, KEYCLOAK_CREDENTIALS};
use crate::error::{DeployError, DeployResult};
use crate::stage::{
    KEYCLOAK_CONFIGURATION_STAGE, KEYCLOAK_STAGE, StageEnv, StageOutputs, TerraformModule,
};
use crate::terraform::VarMap;

/// Realm holding platform users.
pub const REALM_ID: &str = "skyforge";

const GROUPS: [&str; 4] = ["superadmin", "admin", "developer", "analyst"];
const DEFAULT_GROUPS: [&str; 1] = ["analyst"];
const SHARED_USERS_GROUP: &str = "users";

fn admin_credentials(outputs: &StageOutputs) -> DeployResult<KeycloakCredentials> {
    KeycloakCredentials::from_value(outputs.value(KEYCLOAK_STAGE, "keycloak_credentials")?)
}

#[derive(Debug, Clone, Copy)]
pub struct KeycloakModule;

impl TerraformModule for KeycloakModule {
    fn name(&self) -> &'static str {
        KEYCLOAK_STAGE
    }

    fn input_vars(&self, env: &StageEnv, outputs: &StageOutputs) -> DeployResult<VarMap> {
        let password = env
            .config
            .security
            .keycloak
            .initial_root_password
            .clone()
            .ok_or_else(|| {
                DeployError::Config(
                    "security.keycloak.initial_root_password must be set".to_string(),
                )
            })?;
        let general = env.provider.node_group_selectors().remove("general");

        let mut vars = cluster_vars(env);
        vars.insert("endpoint".to_string(), json!(endpoint(env, outputs)?));
        vars.insert("initial_root_password".to_string(), json!(password));
        vars.insert("node_group".to_string(), json!(general));
        Ok(vars)
    }

    fn check(
        &self,
        env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        check_admin_access(
            KEYCLOAK_STAGE,
            env.identity.as_ref(),
            &admin_credentials(outputs)?,
            &env.check_policy(),
        )
    }

    fn credentials(
        &self,
        _env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<Option<CredentialScope>> {
        let credentials = outputs.object_value(KEYCLOAK_STAGE, "keycloak_credentials")?;
        Ok(Some(CredentialScope::from_mapping(
            "keycloak",
            KEYCLOAK_CREDENTIALS,
            credentials,
        )))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeycloakConfigurationModule;

impl TerraformModule for KeycloakConfigurationModule {
    fn name(&self) -> &'static str {
        KEYCLOAK_CONFIGURATION_STAGE
    }

    fn input_vars(&self, env: &StageEnv, _outputs: &StageOutputs) -> DeployResult<VarMap> {
        let mut groups: Vec<&str> = GROUPS.to_vec();
        let mut default_groups: Vec<&str> = DEFAULT_GROUPS.to_vec();
        if env.config.security.shared_users_group {
            groups.push(SHARED_USERS_GROUP);
            default_groups.push(SHARED_USERS_GROUP);
        }

        Ok(VarMap::from_iter([
            ("realm".to_string(), json!(REALM_ID)),
            (
                "realm_display_name".to_string(),
                json!(env.config.security.keycloak.realm_display_name),
            ),
            ("keycloak_groups".to_string(), json!(groups)),
            ("default_groups".to_string(), json!(default_groups)),
        ]))
    }

    /// Realm creation propagates slowly, so this check backs off.
    fn check(
        &self,
        env: &StageEnv,
        _ctx: &ExecutionContext,
        outputs: &StageOutputs,
    ) -> DeployResult<()> {
        check_realm_exists(
            KEYCLOAK_CONFIGURATION_STAGE,
            env.identity.as_ref(),
            &admin_credentials(outputs)?,
            REALM_ID,
            &env.slow_check_policy(),
        )
    }
}
