//! Identity-provider admin checks.

use std::fmt;

use anyhow::Context;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::error::{DeployError, DeployResult};
use crate::retry::{Attempt, RetryPolicy, retry};

/// Admin credentials as published by the identity-provider stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeycloakCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_realm() -> String {
    "master".to_string()
}

fn default_client_id() -> String {
    "admin-cli".to_string()
}

impl KeycloakCredentials {
    pub fn from_value(value: &Value) -> DeployResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DeployError::Invariant(format!("malformed keycloak credentials: {e}")))
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let base = self.url.trim_end_matches('/');
        Url::parse(&format!("{base}/auth/{path}"))
            .with_context(|| format!("Invalid keycloak url: {}", self.url))
    }
}

pub trait IdentityProviderApi: fmt::Debug + Send + Sync {
    /// Realm names visible to the admin account.
    fn realms(&self, credentials: &KeycloakCredentials) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct KeycloakAdmin {
    client: Client,
}

impl KeycloakAdmin {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn token(&self, credentials: &KeycloakCredentials) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let url = credentials.endpoint(&format!(
            "realms/{}/protocol/openid-connect/token",
            credentials.realm
        ))?;
        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", credentials.client_id.as_str()),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .context("Failed to request admin token")?
            .error_for_status()
            .context("Admin token request rejected")?;
        let token: TokenResponse = response.json().context("Malformed token response")?;
        Ok(token.access_token)
    }
}

impl IdentityProviderApi for KeycloakAdmin {
    fn realms(&self, credentials: &KeycloakCredentials) -> anyhow::Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Realm {
            realm: String,
        }

        let token = self.token(credentials)?;
        let realms: Vec<Realm> = self
            .client
            .get(credentials.endpoint("admin/realms")?)
            .bearer_auth(token)
            .send()
            .context("Failed to list realms")?
            .error_for_status()
            .context("Realm listing rejected")?
            .json()
            .context("Malformed realm listing")?;
        Ok(realms.into_iter().map(|r| r.realm).collect())
    }
}

/// The admin account can sign in and list realms.
pub fn check_admin_access(
    stage: &str,
    api: &dyn IdentityProviderApi,
    credentials: &KeycloakCredentials,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    retry(policy, |_| match api.realms(credentials) {
        Ok(realms) => Attempt::Success(realms),
        Err(e) => Attempt::Retry(format!("unable to connect to keycloak master realm: {e:#}")),
    })
    .into_validation(stage, &credentials.url)?;
    info!(stage, url = %credentials.url, "keycloak admin access confirmed");
    Ok(())
}

/// `realm` has been created.
pub fn check_realm_exists(
    stage: &str,
    api: &dyn IdentityProviderApi,
    credentials: &KeycloakCredentials,
    realm: &str,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    retry(policy, |_| match api.realms(credentials) {
        Ok(realms) if realms.iter().any(|r| r == realm) => Attempt::Success(()),
        Ok(_) => Attempt::Retry(format!("realm {realm} does not exist yet")),
        Err(e) => Attempt::Retry(format!("unable to list realms: {e:#}")),
    })
    .into_validation(stage, &format!("realm/{realm}"))?;
    info!(stage, realm, "keycloak realm exists");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct SlowRealm {
        calls: AtomicU32,
    }

    impl IdentityProviderApi for SlowRealm {
        fn realms(&self, _: &KeycloakCredentials) -> anyhow::Result<Vec<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < 2 {
                Ok(vec!["master".to_string()])
            } else {
                Ok(vec!["master".to_string(), "skyforge".to_string()])
            }
        }
    }

    fn credentials() -> KeycloakCredentials {
        KeycloakCredentials::from_value(&json!({
            "url": "https://demo.example.com/",
            "username": "root",
            "password": "pw",
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_realm_and_client() {
        let creds = credentials();
        assert_eq!(creds.realm, "master");
        assert_eq!(creds.client_id, "admin-cli");
        assert_eq!(
            creds.endpoint("admin/realms").unwrap().as_str(),
            "https://demo.example.com/auth/admin/realms"
        );
    }

    #[test]
    fn realm_propagation_is_awaited() {
        let api = SlowRealm::default();
        check_realm_exists(
            "06-kubernetes-keycloak-configuration",
            &api,
            &credentials(),
            "skyforge",
            &RetryPolicy::fixed(5, Duration::ZERO),
        )
        .unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn malformed_credentials_are_an_invariant_violation() {
        let err = KeycloakCredentials::from_value(&json!({"url": "x"})).unwrap_err();
        assert!(matches!(err, DeployError::Invariant(_)));
    }
}
