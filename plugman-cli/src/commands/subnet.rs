//! `plugman join-subnet`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::commands::install::print_install;
use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct JoinSubnetArgs {
    /// Subnet alias, or `org/repo:alias`.
    pub alias: String,
}

impl JoinSubnetArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let report = manager
            .join_subnet(&self.alias)
            .with_context(|| format!("failed to join subnet '{}'", self.alias))?;

        for vm in &report.vms {
            print_install(vm);
        }
        if report.load_deferred || report.whitelist_deferred {
            println!(
                "{} node at {} is offline; restart it with --whitelisted-subnets={} to finish",
                "!".yellow(),
                manager.config().admin_api_endpoint,
                report.subnet_id
            );
        } else {
            println!(
                "{} joined {} ({})",
                "✓".green(),
                report.subnet,
                report.subnet_id
            );
        }
        Ok(())
    }
}
