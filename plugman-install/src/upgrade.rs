//! Reinstalling VMs whose definition moved to a newer version.

use plugman_core::{
    InstallInfo, InstalledStore, KvStore, QualifiedName, RepoAlias, RepositoryStore, Version,
};

use crate::error::InstallError;
use crate::install::place;
use crate::installer::Installer;

/// What happened to one installed VM during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    UpToDate { version: Version },
    Upgraded { from: Version, to: Version },
    /// The repository no longer defines this VM; the install was left alone.
    DefinitionMissing { version: Version },
    NotInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub name: QualifiedName,
    pub outcome: UpgradeOutcome,
}

impl UpgradeReport {
    pub fn upgraded(&self) -> bool {
        matches!(self.outcome, UpgradeOutcome::Upgraded { .. })
    }
}

/// Upgrade a single installed VM.
pub fn upgrade_vm(
    store: &KvStore,
    installer: &dyn Installer,
    name: &QualifiedName,
) -> Result<UpgradeReport, InstallError> {
    let installed = store.view(|txn| InstalledStore::new().get_opt(txn, name))?;
    let outcome = match installed {
        Some(info) => upgrade_installed(store, installer, name, &info)?,
        None => {
            tracing::info!(vm = %name, "not installed; nothing to upgrade");
            UpgradeOutcome::NotInstalled
        }
    };
    Ok(UpgradeReport {
        name: name.clone(),
        outcome,
    })
}

/// Upgrade every installed VM.
pub fn upgrade_all(
    store: &KvStore,
    installer: &dyn Installer,
) -> Result<Vec<UpgradeReport>, InstallError> {
    let installed = store.view(|txn| InstalledStore::new().list(txn))?;
    upgrade_each(store, installer, installed)
}

/// Upgrade the installed VMs that come from `repository`.
pub fn upgrade_repository(
    store: &KvStore,
    installer: &dyn Installer,
    repository: &RepoAlias,
) -> Result<Vec<UpgradeReport>, InstallError> {
    let installed = store.view(|txn| InstalledStore::new().for_repository(txn, repository))?;
    upgrade_each(store, installer, installed)
}

fn upgrade_each(
    store: &KvStore,
    installer: &dyn Installer,
    installed: Vec<(QualifiedName, InstallInfo)>,
) -> Result<Vec<UpgradeReport>, InstallError> {
    installed
        .into_iter()
        .map(|(name, info)| {
            let outcome = upgrade_installed(store, installer, &name, &info)?;
            Ok(UpgradeReport { name, outcome })
        })
        .collect()
}

fn upgrade_installed(
    store: &KvStore,
    installer: &dyn Installer,
    name: &QualifiedName,
    info: &InstallInfo,
) -> Result<UpgradeOutcome, InstallError> {
    let definition = store.view(|txn| {
        RepositoryStore::new(&name.repository)
            .vms()
            .get_opt(txn, &name.plugin)
    })?;
    let Some(definition) = definition else {
        tracing::warn!(
            vm = %name,
            "installed vm is no longer defined by its repository; skipping"
        );
        return Ok(UpgradeOutcome::DefinitionMissing {
            version: info.version,
        });
    };

    let available = definition.definition.version;
    if available <= info.version {
        tracing::debug!(vm = %name, version = %info.version, "up to date");
        return Ok(UpgradeOutcome::UpToDate {
            version: info.version,
        });
    }

    tracing::info!(vm = %name, from = %info.version, to = %available, "upgrading");
    if definition.definition.id != info.id {
        // The id names the binary; drop the old one so it is not left behind.
        installer.remove(&info.id)?;
    }
    place(store, installer, name, &definition)?;
    Ok(UpgradeOutcome::Upgraded {
        from: info.version,
        to: available,
    })
}
