//! Install and uninstall of a single resolved VM.

use std::path::PathBuf;

use chrono::Utc;

use plugman_core::{
    Definition, InstallInfo, InstalledStore, KvStore, QualifiedName, RepositoryStore,
    Version, VmDefinition,
};

use crate::error::InstallError;
use crate::installer::Installer;

/// Result of [`install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed {
        name: QualifiedName,
        version: Version,
        path: PathBuf,
    },
    /// A record for this name already exists; nothing was touched.
    AlreadyInstalled { name: QualifiedName, version: Version },
}

/// Result of [`uninstall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    Uninstalled {
        name: QualifiedName,
        /// `false` when the binary had already disappeared from disk.
        removed_binary: bool,
    },
    NotInstalled { name: QualifiedName },
}

/// Install the VM `name` from its repository's stored definition.
pub fn install(
    store: &KvStore,
    installer: &dyn Installer,
    name: &QualifiedName,
) -> Result<InstallOutcome, InstallError> {
    let installed = InstalledStore::new();
    if let Some(info) = store.view(|txn| installed.get_opt(txn, name))? {
        tracing::info!(vm = %name, version = %info.version, "already installed");
        return Ok(InstallOutcome::AlreadyInstalled {
            name: name.clone(),
            version: info.version,
        });
    }

    let definition = store.view(|txn| {
        RepositoryStore::new(&name.repository)
            .vms()
            .get(txn, &name.plugin)
    })?;
    let (info, path) = place(store, installer, name, &definition)?;
    Ok(InstallOutcome::Installed {
        name: name.clone(),
        version: info.version,
        path,
    })
}

/// Remove the binary and the install record of `name`.
pub fn uninstall(
    store: &KvStore,
    installer: &dyn Installer,
    name: &QualifiedName,
) -> Result<UninstallOutcome, InstallError> {
    let installed = InstalledStore::new();
    let Some(info) = store.view(|txn| installed.get_opt(txn, name))? else {
        tracing::info!(vm = %name, "not installed");
        return Ok(UninstallOutcome::NotInstalled { name: name.clone() });
    };

    let removed_binary = installer.remove(&info.id)?;
    if !removed_binary {
        tracing::warn!(vm = %name, id = %info.id, "binary was already missing");
    }
    store.update(|txn| installed.delete(txn, name))?;
    tracing::info!(vm = %name, "uninstalled");
    Ok(UninstallOutcome::Uninstalled {
        name: name.clone(),
        removed_binary,
    })
}

/// Install `definition`'s binary and write its record, replacing any
/// previous record for `name`.
pub(crate) fn place(
    store: &KvStore,
    installer: &dyn Installer,
    name: &QualifiedName,
    definition: &Definition<VmDefinition>,
) -> Result<(InstallInfo, PathBuf), InstallError> {
    let vm = &definition.definition;
    let path = installer.install(vm)?;

    let info = InstallInfo {
        id: vm.id.clone(),
        version: vm.version,
        commit: definition.commit,
        installed_at: Utc::now(),
    };
    store.update(|txn| InstalledStore::new().put(txn, name, &info))?;
    tracing::info!(vm = %name, version = %info.version, commit = %info.commit.short(), "installed");
    Ok((info, path))
}
