//! Alias registry: a reverse index from a bare plugin alias to the set of
//! repositories that define it.
//!
//! A bare alias listed by exactly one repository resolves to
//! `<org/repo>:<alias>`; listed by more than one it is ambiguous and callers
//! must pass the qualified form.

use std::ops::ControlFlow;

use crate::error::CoreError;
use crate::kv::{KeyValue, KeyValueMut, Namespace, Storage};
use crate::repository::RepositoryStore;
use crate::types::{Definition, Plugin, QualifiedName, RepoAlias, RepoList};

/// Global alias → repositories index.
#[derive(Debug, Clone)]
pub struct AliasRegistry {
    lists: Storage<RepoList>,
}

impl Default for AliasRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self {
            lists: Storage::new(Namespace::root("registry")),
        }
    }

    /// Fetch the entry for `alias`; [`CoreError::NotFound`] when unknown.
    pub fn get(&self, kv: &impl KeyValue, alias: &str) -> Result<RepoList, CoreError> {
        self.lists.get(kv, alias)
    }

    pub fn put(&self, kv: &impl KeyValueMut, alias: &str, list: &RepoList) -> Result<(), CoreError> {
        self.lists.put(kv, alias, list)
    }

    /// Record that `repository` defines `alias`. Idempotent: returns `false`
    /// when the repository was already listed.
    pub fn add_repository(
        &self,
        kv: &impl KeyValueMut,
        alias: &str,
        repository: &RepoAlias,
    ) -> Result<bool, CoreError> {
        let mut list = self.lists.get_opt(kv, alias)?.unwrap_or_default();
        if !list.insert(repository.clone()) {
            return Ok(false);
        }
        self.lists.put(kv, alias, &list)?;
        Ok(true)
    }

    /// Drop `repository` from the entry for `alias`, deleting the entry once
    /// no repository is left. Returns `false` if it was not listed.
    pub fn remove_repository(
        &self,
        kv: &impl KeyValueMut,
        alias: &str,
        repository: &RepoAlias,
    ) -> Result<bool, CoreError> {
        let Some(mut list) = self.lists.get_opt(kv, alias)? else {
            return Ok(false);
        };
        if !list.remove(repository) {
            return Ok(false);
        }
        if list.is_empty() {
            self.lists.delete(kv, alias)?;
        } else {
            self.lists.put(kv, alias, &list)?;
        }
        Ok(true)
    }

    /// Remove `repository` from every entry; returns the aliases touched.
    pub fn purge_repository(
        &self,
        kv: &impl KeyValueMut,
        repository: &RepoAlias,
    ) -> Result<Vec<String>, CoreError> {
        let mut listed = Vec::new();
        self.lists.for_each(kv, |alias, list| {
            if list.contains(repository) {
                listed.push(alias.to_owned());
            }
            Ok(ControlFlow::Continue(()))
        })?;
        for alias in &listed {
            self.remove_repository(kv, alias, repository)?;
        }
        Ok(listed)
    }

    /// Resolve a user-supplied plugin name.
    ///
    /// Qualified names (`org/repo:alias`) are parsed as-is. Bare aliases are
    /// looked up: unknown → [`CoreError::NotFound`], more than one candidate →
    /// [`CoreError::AmbiguousAlias`].
    pub fn resolve(&self, kv: &impl KeyValue, name: &str) -> Result<QualifiedName, CoreError> {
        if QualifiedName::is_qualified(name) {
            return name.parse();
        }

        let list = self.lists.get(kv, name)?;
        let mut repositories = list.repositories.into_iter();
        match (repositories.next(), repositories.next()) {
            (Some(repository), None) => Ok(QualifiedName::new(repository, name)),
            (None, _) => Err(CoreError::NotFound {
                namespace: self.lists.namespace().to_string(),
                key: name.to_owned(),
            }),
            (Some(first), Some(second)) => Err(CoreError::AmbiguousAlias {
                alias: name.to_owned(),
                candidates: [first, second]
                    .into_iter()
                    .chain(repositories)
                    .map(|r| QualifiedName::new(r, name).to_string())
                    .collect(),
            }),
        }
    }

    /// Resolve `name` and load the matching definition from its repository.
    pub fn lookup<T: Plugin>(
        &self,
        kv: &impl KeyValue,
        name: &str,
    ) -> Result<(QualifiedName, Definition<T>), CoreError> {
        let qualified = self.resolve(kv, name)?;
        let definition = RepositoryStore::new(&qualified.repository)
            .definitions::<T>()
            .get(kv, &qualified.plugin)?;
        Ok((qualified, definition))
    }
}
