//! gl-labeler CLI
//!
//! Command line tool for managing GitLab project labels

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use gl_labeler::config::{default_config_path, TOKEN_ENV, URL_ENV};
use gl_labeler::{AppConfig, BatchOperation, BatchReport, LabelEngine, Repo, RepoTarget};

/// gl-labeler CLI
///
/// Bulk label management for GitLab projects
#[derive(Parser)]
#[command(
    name = "gl-labeler",
    version,
    about = "Bulk label management for GitLab projects",
    long_about = "Rename, recolor, delete and copy GitLab labels in bulk, \
    selecting labels with regular expressions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository name (as in the config file) or group/repo path
    #[arg(short = 'r', long, global = true, default_value = "")]
    repo: String,

    /// Repository or instance URL (e.g. https://gitlab.com/group/repo)
    #[arg(short = 'U', long, global = true)]
    url: Option<String>,

    /// GitLab token
    #[arg(short = 't', long, global = true)]
    token: Option<String>,

    /// Configuration file path (default: ~/.gl-labeler.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Label actions
    #[command(visible_alias = "l")]
    Label {
        #[command(subcommand)]
        command: LabelCommands,
    },

    /// Config actions
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum LabelCommands {
    /// Update labels matching a regular expression
    #[command(
        visible_alias = "u",
        after_help = "Example:\n  $ gl-labeler label update -r myrepo --match \"(.*):(.*)\" --replace '${1}/${2}'"
    )]
    Update(UpdateArgs),

    /// Delete labels, optionally only those matching a regular expression
    #[command(visible_alias = "d")]
    Delete {
        /// Label name pattern; all labels are deleted if omitted
        #[arg(long, default_value = "")]
        regex: String,
    },

    /// Copy labels into a repository
    ///
    /// Without --from the instance's global labels are copied. The source can
    /// be a saved repository name or a group/repo path on the same instance.
    #[command(visible_alias = "c")]
    Copy {
        /// Source repository
        #[arg(long)]
        from: Option<String>,
    },

    /// Display the labels of a repository
    List {
        /// Output format
        #[arg(long, default_value = "table", value_parser = ["table", "json", "yaml"])]
        format: String,
    },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("change")
        .required(true)
        .multiple(true)
        .args(["replace", "color"])
))]
struct UpdateArgs {
    /// Label name pattern (regular expression)
    #[arg(long = "match")]
    pattern: String,

    /// New label name; ${1}, ${2}... expand capture groups
    #[arg(long)]
    replace: Option<String>,

    /// New label color (e.g. '#000000')
    #[arg(long)]
    color: Option<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Saved repository actions
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Save a repository into the config file
    Save,

    /// Show a saved repository
    Show,

    /// List saved repositories
    Ls,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red(), e);
        std::process::exit(1);
    }
}

/// Initialize tracing output on stderr
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "gl_labeler=debug,reqwest=warn"
    } else {
        "gl_labeler=warn,reqwest=error"
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match &cli.command {
        Commands::Label { command } => run_label(&cli, &config, command).await,
        Commands::Config {
            command: ConfigCommands::Repo { command },
        } => run_config_repo(&cli, config, config_path, command).await,
    }
}

async fn run_label(cli: &Cli, config: &AppConfig, command: &LabelCommands) -> anyhow::Result<()> {
    let target = repo_target(cli, config, &cli.repo).context("invalid repository")?;
    let to = Repo::connect(target, cli.insecure)
        .await
        .context("invalid repository")?;
    let path = to.project.path_with_namespace.clone();
    let engine = LabelEngine::new(&to.client);

    match command {
        LabelCommands::Update(args) => {
            let report = engine
                .update_by_pattern(
                    to.project.id,
                    &args.pattern,
                    args.replace.as_deref().unwrap_or_default(),
                    args.color.as_deref(),
                )
                .await?;
            display_report(&report, &path, cli.verbose);
        }

        LabelCommands::Delete { regex } => {
            let report = engine.delete_by_pattern(to.project.id, regex).await?;
            display_report(&report, &path, cli.verbose);
        }

        LabelCommands::Copy { from: None } => {
            let report = engine
                .copy_global_labels_to(to.project.id)
                .await
                .with_context(|| format!("'{}'", path))?;
            display_report(&report, &path, cli.verbose);
        }

        LabelCommands::Copy { from: Some(from) } => {
            let source = if config.get(from).is_some() {
                let token = flag_or_env(cli.token.clone(), TOKEN_ENV);
                RepoTarget::from_config(config, from, None, token.as_deref())
            } else {
                to.target.sibling(from)
            }
            .context("invalid source repository")?;

            if source.instance_url() != to.target.instance_url() {
                bail!(
                    "source and target repositories must be on the same GitLab instance ({} vs {})",
                    source.instance_url(),
                    to.target.instance_url()
                );
            }

            let from = Repo::connect(source, cli.insecure)
                .await
                .context("invalid source repository")?;
            let report = engine
                .copy_labels(from.project.id, to.project.id)
                .await
                .with_context(|| {
                    format!("'{}' to '{}'", from.project.path_with_namespace, path)
                })?;
            display_report(&report, &path, cli.verbose);
        }

        LabelCommands::List { format } => {
            let labels = engine.list_all_labels(to.project.id).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&labels)?),
                "yaml" => println!("{}", serde_yaml::to_string(&labels)?),
                _ => {
                    println!(
                        "{:<30} {:<8} {:<50}",
                        "Name".cyan(),
                        "Color".cyan(),
                        "Description".cyan()
                    );
                    println!("{}", "─".repeat(90));
                    for label in labels {
                        println!(
                            "{:<30} {:<8} {:<50}",
                            label.name,
                            label.color,
                            label.description.as_deref().unwrap_or("(none)")
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_config_repo(
    cli: &Cli,
    mut config: AppConfig,
    config_path: PathBuf,
    command: &RepoCommands,
) -> anyhow::Result<()> {
    match command {
        RepoCommands::Save => {
            let name = require_repo_name(&cli.repo)?;
            let target = if cli.url.is_some() || config.get(name).is_none() {
                repo_target(cli, &config, "")
            } else {
                repo_target(cli, &config, name)
            }
            .context("invalid repository")?;

            let repo = Repo::connect(target, cli.insecure)
                .await
                .context("invalid repository")?;
            repo.check_auth().await?;

            config.insert(name, repo.target.to_repo_config());
            config
                .save(&config_path)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
            println!(
                "{} Saved '{}' to {}",
                "✓".green(),
                name.cyan(),
                config_path.display()
            );
        }

        RepoCommands::Show => {
            let name = require_repo_name(&cli.repo)?;
            if config.get(name).is_none() {
                bail!("no saved repository named '{}'", name);
            }
            let target = RepoTarget::from_config(&config, name, None, None)?;
            println!("{}", target);
        }

        RepoCommands::Ls => {
            for name in config.repos.keys() {
                match RepoTarget::from_config(&config, name, None, None) {
                    Ok(target) => println!("{}", target),
                    Err(e) => eprintln!("{} {}: {}", "!".yellow(), name, e),
                }
            }
        }
    }

    Ok(())
}

/// Resolve a repository from the config file, flags and environment
fn repo_target(cli: &Cli, config: &AppConfig, name_or_path: &str) -> gl_labeler::Result<RepoTarget> {
    let url = flag_or_env(cli.url.clone(), URL_ENV);
    let token = flag_or_env(cli.token.clone(), TOKEN_ENV);
    RepoTarget::from_config(config, name_or_path, url.as_deref(), token.as_deref())
}

/// Require a repository name argument
fn require_repo_name(repo: &str) -> anyhow::Result<&str> {
    if repo.is_empty() {
        bail!("no repo name given. Use -r or --repo");
    }
    Ok(repo)
}

/// Take a flag value, falling back to an environment variable
fn flag_or_env(arg: Option<String>, var: &str) -> Option<String> {
    arg.or_else(|| std::env::var(var).ok())
        .filter(|value| !value.trim().is_empty())
}

/// Display the outcome of a bulk label operation
fn display_report(report: &BatchReport, path: &str, verbose: bool) {
    let verb = match report.operation {
        BatchOperation::Update => "Updated",
        BatchOperation::Delete => "Deleted",
        BatchOperation::Copy => "Copied",
    };

    if report.succeeded.is_empty() {
        println!("{} No matching labels in {}", "✓".green(), path.cyan());
        return;
    }

    println!(
        "{} {} {} labels in {}",
        "✓".green(),
        verb,
        report.succeeded.len().to_string().green(),
        path.cyan()
    );

    if verbose {
        for (i, name) in report.succeeded.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
    }
}
