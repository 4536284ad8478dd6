//! Per-repository definition namespaces.

use crate::error::CoreError;
use crate::kv::{KeyValue, KeyValueMut, Namespace, Storage};
use crate::types::{
    Definition, Plugin, RepoAlias, SubnetDefinition, VmDefinition,
};

/// The VM and subnet definitions loaded from one repository, keyed by alias.
///
/// Each repository owns a disjoint namespace; clearing or purging one never
/// touches another.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    alias: RepoAlias,
    root: Namespace,
}

impl RepositoryStore {
    pub fn new(alias: &RepoAlias) -> Self {
        Self {
            alias: alias.clone(),
            root: Namespace::root("repo").child(&alias.to_string()),
        }
    }

    pub fn alias(&self) -> &RepoAlias {
        &self.alias
    }

    /// Typed storage for the category `T` belongs to.
    pub fn definitions<T: Plugin>(&self) -> Storage<Definition<T>> {
        Storage::new(self.root.child(T::KIND.file_key()))
    }

    pub fn vms(&self) -> Storage<Definition<VmDefinition>> {
        self.definitions()
    }

    pub fn subnets(&self) -> Storage<Definition<SubnetDefinition>> {
        self.definitions()
    }

    /// True when the repository defines `alias` under any category.
    pub fn defines(&self, kv: &impl KeyValue, alias: &str) -> Result<bool, CoreError> {
        Ok(self.vms().has(kv, alias)? || self.subnets().has(kv, alias)?)
    }

    /// Delete every definition of every category; returns the aliases removed.
    pub fn clear(&self, kv: &impl KeyValueMut) -> Result<Vec<String>, CoreError> {
        let mut removed = self.vms().clear(kv)?;
        removed.extend(self.subnets().clear(kv)?);
        removed.sort();
        removed.dedup();
        Ok(removed)
    }
}
