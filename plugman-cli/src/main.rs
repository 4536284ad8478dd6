//! plugman: manage Avalanche VM plugins from git-hosted definition repositories.
//!
//! # Usage
//!
//! ```text
//! plugman [global flags] install <alias>
//! plugman [global flags] uninstall <alias>
//! plugman [global flags] update [--repository <org/repo>] [--dry-run]
//! plugman [global flags] upgrade [alias]
//! plugman [global flags] add-repository <org/repo> <url> [--branch main]
//! plugman [global flags] remove-repository <org/repo>
//! plugman [global flags] join-subnet <alias>
//! plugman [global flags] list-repositories [--json]
//! ```
//!
//! Global flags: `--config-file`, `--directory`, `--plugin-dir`,
//! `--credentials-file`, `--admin-api-endpoint`.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use commands::{
    install::{InstallArgs, UninstallArgs},
    repository::{AddRepositoryArgs, ListRepositoriesArgs, RemoveRepositoryArgs},
    subnet::JoinSubnetArgs,
    update::{UpdateArgs, UpgradeArgs},
};
use plugman_core::{Config, Overrides};
use plugman_sync::Manager;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "plugman",
    version,
    about = "Install and keep Avalanche VM plugins up to date",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every command. Each one overrides the config file.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// YAML config file (default: ~/.plugman/config.yaml if present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Directory holding plugman's database, working trees and downloads.
    #[arg(long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Directory the node loads VM binaries from.
    #[arg(long, global = true, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// YAML file with `username` / `password` for private repositories.
    #[arg(long, global = true, value_name = "FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Node admin API, e.g. 127.0.0.1:9650/ext/admin.
    #[arg(long, global = true, value_name = "HOST:PORT/PATH")]
    pub admin_api_endpoint: Option<String>,
}

impl GlobalArgs {
    pub fn config(&self) -> Result<Config> {
        let overrides = Overrides {
            directory: self.directory.clone(),
            plugin_dir: self.plugin_dir.clone(),
            credentials_file: self.credentials_file.clone(),
            admin_api_endpoint: self.admin_api_endpoint.clone(),
        };
        Config::load(self.config_file.as_deref(), overrides).context("failed to load config")
    }

    /// Open the store and make sure the default repository is tracked.
    ///
    /// A failed first sync of the default repository is reported and the
    /// command carries on; the next `update` retries it.
    pub fn open(&self) -> Result<Manager> {
        let config = self.config()?;
        let manager = Manager::open(config).context("failed to open plugman state")?;
        if let Err(err) = manager.bootstrap() {
            let alias = &manager.config().default_repository.alias;
            tracing::warn!(repository = %alias, error = %err, "bootstrap sync failed");
            eprintln!(
                "{} could not sync {alias}: {err:#}",
                "warning:".yellow().bold()
            );
        }
        Ok(manager)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a VM by alias or `org/repo:alias`.
    Install(InstallArgs),

    /// Remove an installed VM.
    Uninstall(UninstallArgs),

    /// Fetch tracked repositories and reconcile their definitions.
    Update(UpdateArgs),

    /// Reinstall installed VMs whose definition has a newer version.
    Upgrade(UpgradeArgs),

    /// Track another definition repository.
    AddRepository(AddRepositoryArgs),

    /// Stop tracking a repository and drop its definitions.
    RemoveRepository(RemoveRepositoryArgs),

    /// Install a subnet's VMs and whitelist it on the local node.
    JoinSubnet(JoinSubnetArgs),

    /// Show tracked repositories and their synced commit.
    ListRepositories(ListRepositoriesArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let global = &cli.global;
    match cli.command {
        Commands::Install(args) => args.run(global),
        Commands::Uninstall(args) => args.run(global),
        Commands::Update(args) => args.run(global),
        Commands::Upgrade(args) => args.run(global),
        Commands::AddRepository(args) => args.run(global),
        Commands::RemoveRepository(args) => args.run(global),
        Commands::JoinSubnet(args) => args.run(global),
        Commands::ListRepositories(args) => args.run(global),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
