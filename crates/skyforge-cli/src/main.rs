//! Skyforge - platform deployment orchestrator
//!
//! Usage:
//!   skyforge render -c skyforge-config.yaml      # Write stage files
//!   skyforge deploy -c skyforge-config.yaml      # Render, then deploy every stage
//!   skyforge destroy -c skyforge-config.yaml     # Tear down in reverse order
//!   skyforge upgrade -c skyforge-config.yaml     # Migrate the config file
//!   skyforge validate -c skyforge-config.yaml    # Parse and validate only

mod interactive;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use console::style;
use semver::Version;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyforge_core::config::{ConfigStore, Settings, SkyforgeConfig};
use skyforge_core::error::{DeployError, DeployResult};
use skyforge_core::pipeline::{
    DeployOptions, DestroyOptions, DestroyReport, OUTPUTS_FILENAME, RenderOptions, RenderReport,
    render_project, run_deploy, run_destroy,
};
use skyforge_core::stage::{
    INFRASTRUCTURE_STAGE, SERVICES_STAGE, StageEnv, StageOutputs, platform_stages,
};
use skyforge_core::upgrade::{MIGRATIONS, RELEASE_VERSION, UpgradeStatus, upgrade_config_file};

use crate::interactive::Prompter;

#[derive(Parser)]
#[command(name = "skyforge")]
#[command(about = "Deploy and manage a data science platform", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProjectArgs {
    /// Deployment configuration file
    #[arg(short, long, default_value = skyforge_core::config::CONFIG_FILENAME)]
    config: PathBuf,

    /// Directory stage files are rendered into
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Tool settings file (defaults to the per-user settings.toml)
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render stage files into the output directory
    Render {
        #[command(flatten)]
        project: ProjectArgs,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Deploy every stage in order
    Deploy {
        #[command(flatten)]
        project: ProjectArgs,

        /// Skip post-deploy checks
        #[arg(long)]
        disable_checks: bool,

        /// Deploy the files already on disk
        #[arg(long)]
        skip_render: bool,

        /// Do not ask for confirmation
        #[arg(long)]
        disable_prompt: bool,
    },

    /// Destroy every stage in reverse order
    Destroy {
        #[command(flatten)]
        project: ProjectArgs,

        /// Do not ask for confirmation
        #[arg(long)]
        disable_prompt: bool,

        /// Stop at the first stage that fails to tear down
        #[arg(long)]
        fail_fast: bool,
    },

    /// Upgrade the configuration file to this release
    Upgrade {
        /// Deployment configuration file
        #[arg(short, long, default_value = skyforge_core::config::CONFIG_FILENAME)]
        config: PathBuf,

        /// Do not ask to acknowledge upgrade notices
        #[arg(long)]
        disable_prompt: bool,
    },

    /// Validate the configuration file
    Validate {
        /// Deployment configuration file
        #[arg(short, long, default_value = skyforge_core::config::CONFIG_FILENAME)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyforge=info,skyforge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("{} {err}", style("error:").red().bold());
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn run(command: Commands) -> DeployResult<()> {
    match command {
        Commands::Render { project, dry_run } => {
            let (config, env) = load_project(&project)?;
            let stages = platform_stages(&env);
            let report = render_project(&stages, &config, &project.output, RenderOptions { dry_run })?;
            print_render_report(&report);
            Ok(())
        }
        Commands::Deploy {
            project,
            disable_checks,
            skip_render,
            disable_prompt,
        } => {
            let (config, env) = load_project(&project)?;
            let stages = platform_stages(&env);
            if !skip_render {
                let report =
                    render_project(&stages, &config, &project.output, RenderOptions::default())?;
                print_render_report(&report);
            }
            if !disable_prompt
                && !Prompter::new().confirm_deploy(&config.project_name, stages.len())?
            {
                println!("Deploy cancelled.");
                return Ok(());
            }
            let options = DeployOptions {
                disable_checks,
                outputs_path: Some(project.output.join(OUTPUTS_FILENAME)),
                ..Default::default()
            };
            let outputs = run_deploy(&stages, &config, &options)?;
            print_deploy_summary(&config, &outputs);
            Ok(())
        }
        Commands::Destroy {
            project,
            disable_prompt,
            fail_fast,
        } => {
            let (config, env) = load_project(&project)?;
            if !disable_prompt && !Prompter::new().confirm_destroy(&config.project_name)? {
                println!("Destroy cancelled.");
                return Ok(());
            }
            let stages = platform_stages(&env);
            let options = DestroyOptions {
                ignore_errors: !fail_fast,
                ..Default::default()
            };
            let report = run_destroy(&stages, &config, &options)?;
            print_destroy_report(&report);
            if report.succeeded() {
                Ok(())
            } else {
                Err(DeployError::Other(anyhow::anyhow!(
                    "destroy incomplete; failed stages: {}",
                    report.failed_stages().join(", ")
                )))
            }
        }
        Commands::Upgrade {
            config,
            disable_prompt,
        } => upgrade(&config, disable_prompt),
        Commands::Validate { config } => {
            let config = ConfigStore::new(config).load()?;
            println!(
                "{} {} ({} on {})",
                style("valid:").green().bold(),
                config.project_name,
                config.namespace,
                config.provider.kind()
            );
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> DeployResult<Settings> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Settings::default_path()?,
    };
    Ok(Settings::load(&path)?)
}

fn load_project(project: &ProjectArgs) -> DeployResult<(SkyforgeConfig, StageEnv)> {
    let config = ConfigStore::new(&project.config).load()?;
    let settings = load_settings(project.settings.as_deref())?;
    info!(
        project = %config.project_name,
        provider = %config.provider.kind(),
        config = %project.config.display(),
        "loaded configuration"
    );
    let env = StageEnv::new(config.clone(), settings, &project.output)?;
    Ok((config, env))
}

fn upgrade(config: &Path, disable_prompt: bool) -> DeployResult<()> {
    let store = ConfigStore::new(config);
    let release = Version::parse(RELEASE_VERSION)
        .map_err(|e| DeployError::Invariant(format!("release version {RELEASE_VERSION}: {e}")))?;

    match upgrade_config_file(&store, &release, MIGRATIONS)? {
        UpgradeStatus::AlreadyUpToDate(version) => {
            println!("{} is already at version {version}", config.display());
        }
        UpgradeStatus::Upgraded {
            from,
            to,
            backup,
            notices,
            rerender_ci,
        } => {
            let from = from
                .map(|v| v.to_string())
                .unwrap_or_else(|| "an unversioned release".to_string());
            println!(
                "{} {} from {from} to {to}",
                style("Upgraded").green().bold(),
                config.display()
            );
            println!("Backup written to {}", backup.display());
            let mut prompter = Prompter::new();
            for notice in &notices {
                prompter.notice(notice, disable_prompt)?;
            }
            if rerender_ci {
                println!(
                    "{} CI/CD workflow files embed the release version; run `skyforge render` and commit the result.",
                    style("Note:").yellow().bold()
                );
            }
        }
    }
    Ok(())
}

fn print_render_report(report: &RenderReport) {
    let diff = &report.diff;
    if diff.is_clean() {
        println!("Rendered files are up to date.");
        return;
    }
    let verb = if report.applied.dry_run {
        "Would change"
    } else {
        "Changed"
    };
    println!("{verb}:");
    println!("  {:<10} Path", "Action");
    println!("  {}", "-".repeat(60));
    for path in &diff.new {
        println!("  {:<10} {}", style("new").green(), path);
    }
    for path in &diff.updated {
        println!("  {:<10} {}", style("updated").yellow(), path);
    }
    for path in &diff.deleted {
        println!("  {:<10} {}", style("deleted").red(), path);
    }
    if !diff.untracked.is_empty() {
        println!(
            "  ({} untracked files left in place)",
            diff.untracked.len()
        );
    }
}

fn print_deploy_summary(config: &SkyforgeConfig, outputs: &StageOutputs) {
    println!();
    println!("{}", style("  Deployment complete").bold().cyan());
    println!("  ───────────────────────────");
    println!("  Project:  {}", style(&config.project_name).green());

    if let Ok(kubeconfig) = outputs.str_value(INFRASTRUCTURE_STAGE, "kubeconfig_filename") {
        println!("  Kubeconfig: {}", style(kubeconfig).green());
        println!("    export KUBECONFIG={kubeconfig}");
    }

    if let Ok(services) = outputs.value(SERVICES_STAGE, "service_urls")
        && let Some(services) = services.as_object()
    {
        println!("  Services:");
        for (name, urls) in services {
            let url = urls.get("url").and_then(|u| u.as_str()).unwrap_or("-");
            println!("    {:<20} {}", name, url);
        }
    }
    println!();
}

fn print_destroy_report(report: &DestroyReport) {
    println!("  {:<40} Status", "Stage");
    println!("  {}", "-".repeat(50));
    for (stage, ok) in &report.status {
        let status = if *ok {
            style("destroyed").green()
        } else {
            style("failed").red()
        };
        println!("  {:<40} {}", stage, status);
    }
    for (stage, message) in &report.errors {
        println!("  {stage}: {message}");
    }
}
