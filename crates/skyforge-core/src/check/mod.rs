//! Post-deploy health checks.
//!
//! Every check runs through [`crate::retry::retry`] and reports exhaustion as
//! a [`crate::error::DeployError::Validation`] naming the stage and resource.

pub mod http;
pub mod keycloak;
pub mod kubernetes;
pub mod network;

pub use http::{check_http_health, http_client};
pub use keycloak::{
    IdentityProviderApi, KeycloakAdmin, KeycloakCredentials, check_admin_access,
    check_realm_exists,
};
pub use kubernetes::{ClusterApi, Kubectl, check_namespace_exists, check_nodes_ready};
pub use network::{INGRESS_PORTS, check_dns, check_tcp_ports};
