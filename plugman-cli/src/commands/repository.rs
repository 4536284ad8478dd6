//! `plugman add-repository`, `remove-repository` and `list-repositories`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use plugman_core::SourceInfo;

use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct AddRepositoryArgs {
    /// Alias to track the repository under (`org/repo`).
    pub alias: String,

    /// Git URL of the repository.
    pub url: String,

    /// Branch to follow.
    #[arg(long, default_value = "main")]
    pub branch: String,
}

impl AddRepositoryArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let info = manager
            .add_repository(&self.alias, &self.url, &self.branch)
            .with_context(|| format!("failed to add repository '{}'", self.alias))?;
        println!(
            "{} added {} ({} @ {})",
            "✓".green(),
            info.alias,
            info.url,
            info.branch
        );
        println!("Run `plugman update` to fetch its definitions.");
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RemoveRepositoryArgs {
    /// Alias of the tracked repository (`org/repo`).
    pub alias: String,
}

impl RemoveRepositoryArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let removed = manager
            .remove_repository(&self.alias)
            .with_context(|| format!("failed to remove repository '{}'", self.alias))?;
        println!(
            "{} removed {} ({} definitions)",
            "✓".green(),
            removed.alias,
            removed.definitions.len()
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ListRepositoriesArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListRepositoriesArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let manager = global.open()?;
        let sources = manager
            .list_repositories()
            .context("failed to read tracked repositories")?;

        if self.json {
            let rows: Vec<_> = sources.iter().map(RepositoryJson::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if sources.is_empty() {
            println!("No repositories tracked.");
            return Ok(());
        }
        let rows: Vec<_> = sources.iter().map(RepositoryRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

#[derive(Serialize)]
struct RepositoryJson {
    alias: String,
    url: String,
    branch: String,
    commit: Option<String>,
    synced_at: Option<String>,
}

impl From<&SourceInfo> for RepositoryJson {
    fn from(source: &SourceInfo) -> Self {
        Self {
            alias: source.alias.to_string(),
            url: source.url.clone(),
            branch: source.branch.clone(),
            commit: source.is_synced().then(|| source.commit.to_string()),
            synced_at: source.synced_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Tabled)]
struct RepositoryRow {
    #[tabled(rename = "alias")]
    alias: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "url")]
    url: String,
}

impl From<&SourceInfo> for RepositoryRow {
    fn from(source: &SourceInfo) -> Self {
        Self {
            alias: source.alias.to_string(),
            branch: source.branch.clone(),
            commit: if source.is_synced() {
                source.commit.short()
            } else {
                "never synced".into()
            },
            last_sync: source
                .synced_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".into()),
            url: source.url.clone(),
        }
    }
}
