//! `plugman install` and `plugman uninstall`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use plugman_install::{InstallOutcome, UninstallOutcome};

use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// VM alias, or `org/repo:alias` when several repositories define it.
    pub alias: String,
}

impl InstallArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let outcome = manager
            .install(&self.alias)
            .with_context(|| format!("failed to install '{}'", self.alias))?;
        print_install(&outcome);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// VM alias, or `org/repo:alias`.
    pub alias: String,
}

impl UninstallArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let outcome = manager
            .uninstall(&self.alias)
            .with_context(|| format!("failed to uninstall '{}'", self.alias))?;
        match outcome {
            UninstallOutcome::Uninstalled {
                name,
                removed_binary,
            } => {
                println!("{} uninstalled {name}", "✓".green());
                if !removed_binary {
                    println!("  (binary was already gone)");
                }
            }
            UninstallOutcome::NotInstalled { name } => {
                println!("{name} is not installed");
            }
        }
        Ok(())
    }
}

pub(crate) fn print_install(outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed {
            name,
            version,
            path,
        } => println!(
            "{} installed {name} {version} at {}",
            "✓".green(),
            path.display()
        ),
        InstallOutcome::AlreadyInstalled { name, version } => {
            println!("{name} {version} is already installed")
        }
    }
}
