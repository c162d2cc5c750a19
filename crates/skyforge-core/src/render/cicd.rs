//! CI workflow and ignore-file generation.
//!
//! The generated pipeline redeploys whenever the configuration file changes on
//! the configured branch and, when `commit_render` is set, commits the
//! re-rendered output back.

use serde_json::{Value, json};

use super::RenderedFileSet;
use crate::config::{CONFIG_FILENAME, CiCdConfig, CiCdKind, ProviderKind, SkyforgeConfig};

pub const GITHUB_WORKFLOW_PATH: &str = ".github/workflows/skyforge-ops.yaml";
pub const GITLAB_CI_PATH: &str = ".gitlab-ci.yml";
pub const GITIGNORE_PATH: &str = ".gitignore";

const GITIGNORE: &str = "\
# skyforge local state
.terraform
terraform.tfstate
terraform.tfstate.backup
.terraform.tfstate.lock.info
.skyforge-outputs.json
";

/// Files for the configured CI/CD system plus the `.gitignore`.
pub fn render_cicd(config: &SkyforgeConfig, version: &str) -> anyhow::Result<RenderedFileSet> {
    let mut set = RenderedFileSet::new();
    set.insert_generated(GITIGNORE_PATH, GITIGNORE)?;

    let Some(ci_cd) = &config.ci_cd else {
        return Ok(set);
    };

    match ci_cd.kind {
        CiCdKind::GithubActions => {
            let workflow = github_workflow(config.provider_kind(), ci_cd, version);
            set.insert_generated(GITHUB_WORKFLOW_PATH, serde_yaml::to_string(&workflow)?)?;
        }
        CiCdKind::GitlabCi => {
            let pipeline = gitlab_pipeline(ci_cd, version);
            set.insert_generated(GITLAB_CI_PATH, serde_yaml::to_string(&pipeline)?)?;
        }
        CiCdKind::None => {}
    }
    Ok(set)
}

fn install_command(version: &str) -> String {
    format!("cargo install skyforge-cli --version {version} --locked")
}

fn deploy_command() -> String {
    format!("skyforge deploy --config {CONFIG_FILENAME} --disable-prompt")
}

/// Secrets the deploy job needs, per provider.
fn provider_secrets(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::Aws => &[
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
            "AWS_DEFAULT_REGION",
        ],
        ProviderKind::Azure => &[
            "ARM_CLIENT_ID",
            "ARM_CLIENT_SECRET",
            "ARM_SUBSCRIPTION_ID",
            "ARM_TENANT_ID",
        ],
        ProviderKind::DigitalOcean => &[
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
            "SPACES_ACCESS_KEY_ID",
            "SPACES_SECRET_ACCESS_KEY",
            "DIGITALOCEAN_TOKEN",
        ],
        ProviderKind::Gcp => &["GOOGLE_CREDENTIALS", "PROJECT_ID"],
        ProviderKind::Local => &[],
    }
}

fn github_workflow(provider: ProviderKind, ci_cd: &CiCdConfig, version: &str) -> Value {
    let mut env = serde_json::Map::new();
    env.insert(
        "GITHUB_TOKEN".to_string(),
        json!("${{ secrets.GITHUB_TOKEN }}"),
    );
    for secret in provider_secrets(provider) {
        env.insert(
            (*secret).to_string(),
            json!(format!("${{{{ secrets.{secret} }}}}")),
        );
    }

    let mut steps = vec![
        json!({"name": "Checkout", "uses": "actions/checkout@v4"}),
        json!({"name": "Install skyforge", "run": install_command(version)}),
    ];
    steps.extend(ci_cd.before_script.iter().map(|cmd| json!({"run": cmd})));
    steps.push(json!({
        "name": format!("Deploy changes made in {CONFIG_FILENAME}"),
        "run": deploy_command(),
    }));
    if ci_cd.commit_render {
        steps.push(json!({
            "name": "Push changes",
            "run": format!(
                "git config user.email 'skyforge@users.noreply.github.com' ; \
                 git config user.name 'github action' ; \
                 git add ./.gitignore ./.github ./stages ; \
                 git diff --quiet && git diff --staged --quiet || (git commit -m '${{{{ env.COMMIT_MSG }}}}') ; \
                 git push origin {}",
                ci_cd.branch
            ),
            "env": {"COMMIT_MSG": format!("{CONFIG_FILENAME} automated commit: ${{{{ github.sha }}}}")},
        }));
    }
    steps.extend(ci_cd.after_script.iter().map(|cmd| json!({"run": cmd})));

    json!({
        "name": "skyforge auto update",
        "on": {
            "push": {
                "branches": [ci_cd.branch],
                "paths": [CONFIG_FILENAME],
            }
        },
        "env": env,
        "jobs": {
            "build": {
                "name": "skyforge",
                "runs-on": "ubuntu-latest",
                "permissions": {"id-token": "write", "contents": "read"},
                "steps": steps,
            }
        }
    })
}

fn gitlab_pipeline(ci_cd: &CiCdConfig, version: &str) -> Value {
    let mut script = vec![
        format!("git checkout {}", ci_cd.branch),
        install_command(version),
        deploy_command(),
    ];
    if ci_cd.commit_render {
        script.extend([
            "git config user.email 'skyforge@users.noreply.gitlab.com'".to_string(),
            "git config user.name 'gitlab ci'".to_string(),
            "git add .".to_string(),
            format!(
                "git diff --quiet && git diff --staged --quiet || (git commit -m \"${{COMMIT_MSG}}\" && git push origin {})",
                ci_cd.branch
            ),
        ]);
    }

    json!({
        "render-skyforge": {
            "image": "rust:latest",
            "variables": {"COMMIT_MSG": format!("{CONFIG_FILENAME} automated commit: $CI_COMMIT_SHA")},
            "before_script": ci_cd.before_script,
            "after_script": ci_cd.after_script,
            "script": script,
            "rules": [{
                "if": format!("$CI_COMMIT_BRANCH == '{}'", ci_cd.branch),
                "changes": [CONFIG_FILENAME],
            }],
        }
    })
}
