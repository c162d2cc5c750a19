//! Registered migration steps, oldest first.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_yaml::{Mapping, Value};

use super::{MigrationStep, StepContext};

const DESTRUCTIVE_UPGRADE: &str = "This upgrade tears down and recreates the cluster. Back up \
    any data you wish to keep; prevent_deploy has been set and must be removed by hand before \
    deploying.";

pub static MIGRATIONS: &[MigrationStep] = &[
    MigrationStep {
        version: "0.3.12",
        requires_version_field: false,
        transform: add_conda_store_image,
    },
    MigrationStep {
        version: "0.4.0",
        requires_version_field: true,
        transform: introduce_keycloak,
    },
    MigrationStep {
        version: "0.4.1",
        requires_version_field: true,
        transform: profile_access_types,
    },
    MigrationStep {
        version: "2023.7.1",
        requires_version_field: true,
        transform: rebuild_aws_node_groups,
    },
    MigrationStep {
        version: "2023.10.1",
        requires_version_field: true,
        transform: extension_refactor,
    },
    MigrationStep {
        version: "2024.4.1",
        requires_version_field: true,
        transform: default_node_groups_notice,
    },
    MigrationStep {
        version: "2024.9.1",
        requires_version_field: true,
        transform: node_group_recreation_notice,
    },
];

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// The mapping under `name`, created when absent.
fn mapping_entry<'a>(document: &'a mut Mapping, name: &str) -> anyhow::Result<&'a mut Mapping> {
    document
        .entry(key(name))
        .or_insert_with(|| Value::Mapping(Mapping::new()))
        .as_mapping_mut()
        .ok_or_else(|| anyhow::anyhow!("{name} must be a mapping"))
}

fn provider(document: &Mapping) -> Option<&str> {
    document.get("provider").and_then(Value::as_str)
}

fn prevent_deploy(document: &mut Mapping) {
    document.insert(key("prevent_deploy"), Value::Bool(true));
}

fn add_conda_store_image(document: &mut Mapping, _: &StepContext) -> anyhow::Result<Vec<String>> {
    let images = mapping_entry(document, "default_images")?;
    if images.contains_key("conda_store") {
        return Ok(Vec::new());
    }
    let image = "quansight/conda-store-server:v0.3.3";
    images.insert(key("conda_store"), key(image));
    Ok(vec![format!("Adding default_images.conda_store image as {image}")])
}

fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Keycloak takes over users and groups; the cluster is rebuilt.
fn introduce_keycloak(document: &mut Mapping, ctx: &StepContext) -> anyhow::Result<Vec<String>> {
    let mut notices = Vec::new();

    let security = mapping_entry(document, "security")?;
    if security.remove("users").is_some() {
        notices.push(
            "Removed security.users; import users into Keycloak after redeploying.".to_string(),
        );
    }
    if let Some(groups) = security.remove("groups") {
        if groups.get("users").is_some() {
            security.insert(key("shared_users_group"), Value::Bool(true));
        }
    }
    let password = random_password();
    mapping_entry(security, "keycloak")?.insert(key("initial_root_password"), key(&password));
    notices.push(format!(
        "Generated random password={password} for the Keycloak root user (change it at /auth/)."
    ));

    if document.remove("terraform_modules").is_some() {
        notices.push("Removed terraform_modules, which is no longer used.".to_string());
    }
    let images = mapping_entry(document, "default_images")?;
    images.remove("conda_store");
    images.remove("dask_gateway");

    if let Some(Value::Mapping(azure)) = document.get_mut("azure") {
        azure.remove("project");
    }

    prevent_deploy(document);
    notices.push(format!("{} {DESTRUCTIVE_UPGRADE}", ctx.to));
    Ok(notices)
}

fn profile_access_types(document: &mut Mapping, _: &StepContext) -> anyhow::Result<Vec<String>> {
    let mut notices = Vec::new();
    let Some(Value::Mapping(profiles)) = document.get_mut("profiles") else {
        return Ok(notices);
    };
    let Some(Value::Sequence(jupyterlab)) = profiles.get_mut("jupyterlab") else {
        return Ok(notices);
    };
    for profile in jupyterlab.iter_mut() {
        let Value::Mapping(profile) = profile else {
            continue;
        };
        let access = if profile.contains_key("groups") || profile.contains_key("users") {
            "yaml"
        } else {
            "all"
        };
        let name = profile
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        profile.insert(key("access"), key(access));
        notices.push(format!("Setting access type of JupyterLab profile {name} to {access}"));
    }
    Ok(notices)
}

fn rebuild_aws_node_groups(document: &mut Mapping, _: &StepContext) -> anyhow::Result<Vec<String>> {
    if provider(document) != Some("aws") {
        return Ok(Vec::new());
    }
    prevent_deploy(document);
    Ok(vec![DESTRUCTIVE_UPGRADE.to_string()])
}

fn extension_refactor(document: &mut Mapping, ctx: &StepContext) -> anyhow::Result<Vec<String>> {
    let mut notices = vec![
        format!(
            "Version {} restructures the stage layout. Back up your data and remove the stages \
             directory so it is rendered afresh. prevent_deploy has been set.",
            ctx.to
        ),
        "CDS Dashboards are no longer supported and will be uninstalled.".to_string(),
    ];
    prevent_deploy(document);
    if document.remove("cdsdashboards").is_some() {
        notices.push("Removed cdsdashboards from the configuration.".to_string());
    }
    Ok(notices)
}

fn provider_block(provider: &str) -> Option<&'static str> {
    match provider {
        "aws" => Some("amazon_web_services"),
        "gcp" => Some("google_cloud_platform"),
        "azure" => Some("azure"),
        "do" => Some("digital_ocean"),
        _ => None,
    }
}

fn default_node_groups_notice(
    document: &mut Mapping,
    _: &StepContext,
) -> anyhow::Result<Vec<String>> {
    let Some(block) = provider(document).and_then(provider_block) else {
        return Ok(Vec::new());
    };
    let missing = match document.get(block) {
        Some(Value::Mapping(settings)) => !settings.contains_key("node_groups"),
        _ => false,
    };
    if !missing {
        return Ok(Vec::new());
    }
    Ok(vec![format!(
        "{block} has no node_groups; define general, user and worker node groups before deploying."
    )])
}

fn node_group_recreation_notice(
    document: &mut Mapping,
    _: &StepContext,
) -> anyhow::Result<Vec<String>> {
    Ok(match provider(document) {
        Some("azure") => vec![
            "Ensure no users are logged in before deploying; node groups are destroyed and \
             recreated, causing roughly 15 minutes of downtime."
                .to_string(),
        ],
        Some("do") => vec!["DigitalOcean support is deprecated and will be removed.".to_string()],
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::{RELEASE_VERSION, select_steps, upgrade};
    use semver::Version;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn table_is_ordered_and_ends_at_release() {
        let versions: Vec<Version> = MIGRATIONS
            .iter()
            .map(|s| s.parsed_version().unwrap())
            .collect();
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
        assert_eq!(
            versions.last().map(|v| v.to_string()).as_deref(),
            Some(RELEASE_VERSION)
        );
        assert!(select_steps(MIGRATIONS, &Version::new(0, 0, 0), &sorted[sorted.len() - 1]).is_ok());
    }

    #[test]
    fn keycloak_step_generates_password_and_prevents_deploy() {
        let mut document = doc(
            "project_name: demo\nversion: 0.3.14\nprovider: gcp\nsecurity:\n  users: {alice: {}}\n  groups: {users: {}, admin: {}}\nterraform_modules: []\n",
        );

        let outcome = upgrade(&mut document, &Version::new(0, 4, 0), MIGRATIONS).unwrap();

        assert_eq!(outcome.applied, vec![Version::new(0, 4, 0)]);
        assert_eq!(document["version"], "0.4.0");
        assert_eq!(document["prevent_deploy"], true);
        assert_eq!(document["security"]["shared_users_group"], true);
        assert!(document["security"].get("users").is_none());
        assert_eq!(
            document["security"]["keycloak"]["initial_root_password"]
                .as_str()
                .unwrap()
                .len(),
            16
        );
        assert!(document.get("terraform_modules").is_none());
    }

    #[test]
    fn aws_rebuild_only_prevents_deploy_on_aws() {
        let mut gcp = doc("project_name: demo\nversion: 2023.5.1\nprovider: gcp\n");
        upgrade(&mut gcp, &Version::new(2023, 7, 1), MIGRATIONS).unwrap();
        assert!(gcp.get("prevent_deploy").is_none());

        let mut aws = doc("project_name: demo\nversion: 2023.5.1\nprovider: aws\n");
        upgrade(&mut aws, &Version::new(2023, 7, 1), MIGRATIONS).unwrap();
        assert_eq!(aws["prevent_deploy"], true);
    }

    #[test]
    fn extension_refactor_drops_cdsdashboards() {
        let mut document =
            doc("project_name: demo\nversion: 2023.7.1\nprovider: local\ncdsdashboards:\n  enabled: true\n");

        let outcome = upgrade(&mut document, &Version::new(2023, 10, 1), MIGRATIONS).unwrap();

        assert!(document.get("cdsdashboards").is_none());
        assert_eq!(document["prevent_deploy"], true);
        assert!(outcome.notices.iter().any(|n| n.contains("cdsdashboards")));
    }

    #[test]
    fn unversioned_document_reaches_release() {
        let mut document = doc("project_name: demo\nprovider: local\n");
        let release = Version::parse(RELEASE_VERSION).unwrap();

        let outcome = upgrade(&mut document, &release, MIGRATIONS).unwrap();

        assert_eq!(outcome.applied.len(), MIGRATIONS.len());
        assert_eq!(document["version"], RELEASE_VERSION);
    }
}
