//! Joining a subnet: install its VMs, then tell the node about them.

use plugman_core::{KvStore, QualifiedName, RepositoryStore};

use crate::admin::AdminApi;
use crate::error::{AdminError, InstallError};
use crate::install::{install, InstallOutcome};
use crate::installer::Installer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub subnet: QualifiedName,
    pub subnet_id: String,
    pub vms: Vec<InstallOutcome>,
    /// Set when the node could not be reached for `admin.loadVMs`.
    pub load_deferred: bool,
    /// Set when the node could not be reached for `admin.whitelistSubnet`.
    pub whitelist_deferred: bool,
}

/// Install every VM `name` lists (qualified with the subnet's repository),
/// then call `admin.loadVMs` and `admin.whitelistSubnet`.
///
/// An offline node is not an error; the corresponding `*_deferred` flag is
/// set instead.
pub fn join_subnet(
    store: &KvStore,
    installer: &dyn Installer,
    admin: &dyn AdminApi,
    name: &QualifiedName,
) -> Result<JoinReport, InstallError> {
    let definition = store.view(|txn| {
        RepositoryStore::new(&name.repository)
            .subnets()
            .get(txn, &name.plugin)
    })?;
    let subnet = definition.definition;
    tracing::info!(subnet = %name, id = %subnet.id, vms = subnet.vms.len(), "joining subnet");

    let vms = subnet
        .vms
        .iter()
        .map(|vm| install(store, installer, &QualifiedName::new(name.repository.clone(), vm)))
        .collect::<Result<Vec<_>, _>>()?;

    let load_deferred = offline_is_deferred(admin, admin.load_vms())?;
    let whitelist_deferred = offline_is_deferred(admin, admin.whitelist_subnet(&subnet.id))?;

    Ok(JoinReport {
        subnet: name.clone(),
        subnet_id: subnet.id,
        vms,
        load_deferred,
        whitelist_deferred,
    })
}

fn offline_is_deferred(
    admin: &dyn AdminApi,
    result: Result<(), AdminError>,
) -> Result<bool, InstallError> {
    match result {
        Ok(()) => Ok(false),
        Err(err) if err.is_offline() => {
            tracing::warn!(endpoint = admin.endpoint(), "node offline; changes apply on next start");
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}
