//! Credential scoping for dependent stages.
//!
//! Credentials produced by one stage (cluster access, identity-provider admin
//! access) are exposed to later stages through an [`ExecutionContext`]: an
//! immutable stack of [`CredentialScope`] layers. Entering a scope produces a
//! new context; the outer context is never touched, so leaving a scope needs
//! no restore step and nested scopes compose. The process environment is
//! only read, never written. Layers reach external tools through
//! [`ExecutionContext::apply_to`] when a subprocess is spawned.

use std::collections::BTreeMap;
use std::process::Command;

use serde_json::Value;

/// Logical credential name to the variable the Kubernetes tooling reads.
pub const KUBERNETES_CREDENTIALS: &[(&str, &str)] = &[
    ("config_path", "KUBE_CONFIG_PATH"),
    ("config_context", "KUBE_CTX"),
    ("username", "KUBE_USER"),
    ("password", "KUBE_PASSWORD"),
    ("client_certificate", "KUBE_CLIENT_CERT_DATA"),
    ("client_key", "KUBE_CLIENT_KEY_DATA"),
    ("cluster_ca_certificate", "KUBE_CLUSTER_CA_CERT_DATA"),
    ("host", "KUBE_HOST"),
    ("token", "KUBE_TOKEN"),
];

/// Logical credential name to the variable the Keycloak provider reads.
pub const KEYCLOAK_CREDENTIALS: &[(&str, &str)] = &[
    ("client_id", "KEYCLOAK_CLIENT_ID"),
    ("url", "KEYCLOAK_URL"),
    ("username", "KEYCLOAK_USER"),
    ("password", "KEYCLOAK_PASSWORD"),
    ("realm", "KEYCLOAK_REALM"),
];

/// One named layer of variable overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialScope {
    name: String,
    vars: BTreeMap<String, String>,
}

impl CredentialScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Build a scope from a credentials object using a logical-name mapping.
    ///
    /// Keys absent from `mapping`, and null values, are skipped. Non-string
    /// scalars are rendered with their JSON text.
    pub fn from_mapping(
        name: impl Into<String>,
        mapping: &[(&str, &str)],
        credentials: &serde_json::Map<String, Value>,
    ) -> Self {
        let mut scope = Self::new(name);
        for (logical, variable) in mapping {
            let value = match credentials.get(*logical) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            scope.vars.insert((*variable).to_string(), value);
        }
        scope
    }

    pub fn with_var(mut self, variable: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(variable.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Immutable stack of credential scopes threaded through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    layers: Vec<CredentialScope>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child context with `scope` layered on top. `self` is unchanged.
    pub fn scoped(&self, scope: CredentialScope) -> Self {
        let mut layers = self.layers.clone();
        layers.push(scope);
        Self { layers }
    }

    /// Run `f` inside a child context carrying `scope`.
    ///
    /// However `f` ends, the caller's context still holds exactly the values
    /// it held before the call.
    pub fn with_credentials<T, F>(&self, scope: CredentialScope, f: F) -> T
    where
        F: FnOnce(&ExecutionContext) -> T,
    {
        let inner = self.scoped(scope);
        f(&inner)
    }

    /// Resolve a variable: innermost scope first, then the process environment.
    pub fn var(&self, name: &str) -> Option<String> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.vars.get(name).cloned())
            .or_else(|| std::env::var(name).ok())
    }

    /// Flattened overrides, inner scopes winning.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for layer in &self.layers {
            for (k, v) in &layer.vars {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Expose the scoped variables to a subprocess about to be spawned.
    pub fn apply_to(&self, command: &mut Command) {
        command.envs(self.overrides());
    }

    pub fn scope_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ABSENT: &str = "SKYFORGE_TEST_VARIABLE_THAT_IS_NEVER_SET";

    #[test]
    fn scoped_value_is_visible_inside_and_gone_after_error() {
        let outer = ExecutionContext::new().scoped(CredentialScope::new("outer").with_var("X", "pre"));

        let result: Result<(), String> =
            outer.with_credentials(CredentialScope::new("inner").with_var("X", "scoped"), |ctx| {
                assert_eq!(ctx.var("X").as_deref(), Some("scoped"));
                Err("boom".to_string())
            });

        assert!(result.is_err());
        assert_eq!(outer.var("X").as_deref(), Some("pre"));
    }

    #[test]
    fn scoped_value_is_gone_after_panic() {
        let outer = ExecutionContext::new().scoped(CredentialScope::new("outer").with_var("X", "pre"));

        let caught = std::panic::catch_unwind(|| {
            outer.with_credentials::<(), _>(
                CredentialScope::new("inner").with_var("X", "scoped"),
                |_| panic!("stage exploded"),
            )
        });

        assert!(caught.is_err());
        assert_eq!(outer.var("X").as_deref(), Some("pre"));
    }

    #[test]
    fn absent_variable_stays_absent_after_scope() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.var(ABSENT), None);

        ctx.with_credentials(CredentialScope::new("k8s").with_var(ABSENT, "token"), |inner| {
            assert_eq!(inner.var(ABSENT).as_deref(), Some("token"));
        });

        assert_eq!(ctx.var(ABSENT), None);
    }

    #[test]
    fn nested_scopes_restore_to_outer_scope_not_original() {
        let base = ExecutionContext::new();
        let kube = base.scoped(
            CredentialScope::new("kubernetes")
                .with_var("KUBE_HOST", "https://cluster")
                .with_var("SHARED", "outer"),
        );

        kube.with_credentials(
            CredentialScope::new("keycloak").with_var("SHARED", "inner"),
            |inner| {
                assert_eq!(inner.var("SHARED").as_deref(), Some("inner"));
                assert_eq!(inner.var("KUBE_HOST").as_deref(), Some("https://cluster"));
                assert_eq!(inner.scope_names(), vec!["kubernetes", "keycloak"]);
            },
        );

        assert_eq!(kube.var("SHARED").as_deref(), Some("outer"));
        assert_eq!(kube.depth(), 1);
    }

    #[test]
    fn from_mapping_skips_nulls_and_unknown_keys() {
        let creds = json!({
            "host": "https://1.2.3.4",
            "token": "abc",
            "username": null,
            "unrelated": "ignored",
        });
        let scope = CredentialScope::from_mapping(
            "kubernetes",
            KUBERNETES_CREDENTIALS,
            creds.as_object().unwrap(),
        );

        assert_eq!(scope.vars().len(), 2);
        assert_eq!(scope.vars()["KUBE_HOST"], "https://1.2.3.4");
        assert_eq!(scope.vars()["KUBE_TOKEN"], "abc");
    }

    #[test]
    fn overrides_reach_spawned_commands() {
        let ctx = ExecutionContext::new()
            .scoped(CredentialScope::new("a").with_var("A", "1").with_var("B", "1"))
            .scoped(CredentialScope::new("b").with_var("B", "2"));

        let mut cmd = Command::new("true");
        ctx.apply_to(&mut cmd);
        let envs: BTreeMap<_, _> = cmd
            .get_envs()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().to_string(),
                    v.map(|v| v.to_string_lossy().to_string()),
                )
            })
            .collect();

        assert_eq!(envs["A"].as_deref(), Some("1"));
        assert_eq!(envs["B"].as_deref(), Some("2"));
    }
}
