//! `plugman update` and `plugman upgrade`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use plugman_core::RepoAlias;
use plugman_install::{UpgradeOutcome, UpgradeReport};
use plugman_sync::{Change, RepositoryOutcome, RepositoryReport, SyncScope};

use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only sync this repository (`org/repo`).
    #[arg(long, value_name = "ORG/REPO")]
    pub repository: Option<String>,

    /// Compute the changes, then roll them back.
    #[arg(long)]
    pub dry_run: bool,
}

impl UpdateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let scope = match self.repository {
            Some(alias) => SyncScope::Repository(
                alias
                    .parse::<RepoAlias>()
                    .with_context(|| format!("invalid repository alias '{alias}'"))?,
            ),
            None => SyncScope::All,
        };

        let summary = manager
            .update(scope, self.dry_run)
            .context("update failed")?;
        for report in &summary.reports {
            print_report(report);
        }
        for (alias, err) in &summary.failures {
            eprintln!("{} {alias}: {err}", "✗".red());
        }
        summary.into_result().context("update failed")?;
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Upgrade only this VM; every installed VM otherwise.
    pub alias: Option<String>,
}

impl UpgradeArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let reports = manager
            .upgrade(self.alias.as_deref())
            .context("upgrade failed")?;
        if reports.is_empty() {
            println!("No VMs installed.");
        }
        for report in &reports {
            print_upgrade(report);
        }
        Ok(())
    }
}

fn print_report(report: &RepositoryReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let alias = &report.alias;
    match &report.outcome {
        RepositoryOutcome::UpToDate => {
            println!(
                "{prefix}{} {alias} up to date at {}",
                "✓".green(),
                report.latest.short()
            );
        }
        RepositoryOutcome::Synced { changes, rebuilt } => {
            println!(
                "{prefix}{} {alias} {} -> {} ({} changes)",
                "✓".green(),
                report.previous.short(),
                report.latest.short(),
                changes.len()
            );
            for change in changes {
                let marker = match change {
                    Change::Added { .. } => "+".green(),
                    Change::Updated { .. } => "~".yellow(),
                    Change::Removed { .. } => "-".red(),
                };
                println!("  {marker} {} {}", change.kind(), change.alias());
            }
            for upgrade in rebuilt {
                print_upgrade(upgrade);
            }
        }
    }
}

fn print_upgrade(report: &UpgradeReport) {
    let name = &report.name;
    match &report.outcome {
        UpgradeOutcome::Upgraded { from, to } => {
            println!("  {} upgraded {name} {from} -> {to}", "↑".green())
        }
        UpgradeOutcome::UpToDate { version } => println!("  {name} {version} is up to date"),
        UpgradeOutcome::DefinitionMissing { version } => println!(
            "  {} {name} {version}: no longer defined by its repository",
            "!".yellow()
        ),
        UpgradeOutcome::NotInstalled => println!("  {name} is not installed"),
    }
}
