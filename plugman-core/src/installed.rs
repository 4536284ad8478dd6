//! Records of VM binaries installed into the plugin directory.

use crate::error::CoreError;
use crate::kv::{KeyValue, KeyValueMut, Namespace, Storage};
use crate::types::{InstallInfo, QualifiedName, RepoAlias};

/// Installed VMs, keyed by `organization/repository:alias`.
#[derive(Debug, Clone)]
pub struct InstalledStore {
    installed: Storage<InstallInfo>,
}

impl Default for InstalledStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstalledStore {
    pub fn new() -> Self {
        Self {
            installed: Storage::new(Namespace::root("installed")),
        }
    }

    pub fn get(&self, kv: &impl KeyValue, name: &QualifiedName) -> Result<InstallInfo, CoreError> {
        self.installed.get(kv, &name.to_string())
    }

    pub fn get_opt(
        &self,
        kv: &impl KeyValue,
        name: &QualifiedName,
    ) -> Result<Option<InstallInfo>, CoreError> {
        self.installed.get_opt(kv, &name.to_string())
    }

    pub fn put(
        &self,
        kv: &impl KeyValueMut,
        name: &QualifiedName,
        info: &InstallInfo,
    ) -> Result<(), CoreError> {
        self.installed.put(kv, &name.to_string(), info)
    }

    pub fn delete(&self, kv: &impl KeyValueMut, name: &QualifiedName) -> Result<(), CoreError> {
        self.installed.delete(kv, &name.to_string())
    }

    /// Every install record, ordered by qualified name. Keys that no longer
    /// parse are skipped with a warning.
    pub fn list(&self, kv: &impl KeyValue) -> Result<Vec<(QualifiedName, InstallInfo)>, CoreError> {
        let mut installed = Vec::new();
        for (key, info) in self.installed.entries(kv)? {
            match key.parse::<QualifiedName>() {
                Ok(name) => installed.push((name, info)),
                Err(err) => tracing::warn!(key = %key, error = %err, "skipping install record"),
            }
        }
        Ok(installed)
    }

    /// Install records whose definition comes from `repository`.
    pub fn for_repository(
        &self,
        kv: &impl KeyValue,
        repository: &RepoAlias,
    ) -> Result<Vec<(QualifiedName, InstallInfo)>, CoreError> {
        Ok(self
            .list(kv)?
            .into_iter()
            .filter(|(name, _)| &name.repository == repository)
            .collect())
    }
}
