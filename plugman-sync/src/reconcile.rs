//! Definition loading and store reconciliation for one repository.
//!
//! ## Pass layout
//!
//! 1. Load every definition file of each kind from the working tree.
//! 2. Write each definition tagged with the new head; register its alias.
//! 3. Purge entries whose commit is not the new head; prune the alias
//!    registry where the repository no longer defines the alias.
//!
//! All three steps run against one [`WriteTxn`] supplied by the caller.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use serde_yaml::Mapping;

use plugman_core::{
    AliasRegistry, CommitHash, Definition, DefinitionKind, Plugin, RepoAlias, RepositoryStore,
    SubnetDefinition, VmDefinition, WriteTxn, valid_plugin_alias,
};

use crate::engine::Cancellation;
use crate::error::{io_err, SyncError};

/// One store mutation made by a pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    Added { kind: DefinitionKind, alias: String },
    Updated { kind: DefinitionKind, alias: String },
    Removed { kind: DefinitionKind, alias: String },
}

impl Change {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Change::Added { kind, .. }
            | Change::Updated { kind, .. }
            | Change::Removed { kind, .. } => *kind,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Change::Added { alias, .. }
            | Change::Updated { alias, .. }
            | Change::Removed { alias, .. } => alias,
        }
    }
}

/// Reconcile `repository`'s namespace with the tree checked out at `tree`,
/// which is at `latest`. Returns the changes in the order they were made.
pub fn reconcile(
    txn: &WriteTxn,
    repository: &RepoAlias,
    tree: &Path,
    latest: CommitHash,
    cancel: &Cancellation,
) -> Result<Vec<Change>, SyncError> {
    let store = RepositoryStore::new(repository);
    let registry = AliasRegistry::new();

    let mut changes = Vec::new();
    changes.extend(apply::<VmDefinition>(txn, &store, &registry, tree, latest, cancel)?);
    changes.extend(apply::<SubnetDefinition>(txn, &store, &registry, tree, latest, cancel)?);

    let mut purged = purge::<VmDefinition>(txn, &store, latest)?;
    purged.extend(purge::<SubnetDefinition>(txn, &store, latest)?);
    for change in &purged {
        if !store.defines(txn, change.alias())?
            && registry.remove_repository(txn, change.alias(), repository)?
        {
            tracing::debug!(alias = change.alias(), repository = %repository, "pruned alias");
        }
    }
    changes.extend(purged);

    Ok(changes)
}

/// Step 2 for one kind.
fn apply<T: Plugin>(
    txn: &WriteTxn,
    store: &RepositoryStore,
    registry: &AliasRegistry,
    tree: &Path,
    latest: CommitHash,
    cancel: &Cancellation,
) -> Result<Vec<Change>, SyncError> {
    let definitions = store.definitions::<T>();
    let mut changes = Vec::new();

    for (path, definition) in load_definitions::<T>(tree, cancel)? {
        let alias = definition.alias().to_owned();
        let previous = definitions.get_opt(txn, &alias)?;

        registry.add_repository(txn, &alias, store.alias())?;
        definitions.put(
            txn,
            &alias,
            &Definition {
                definition: definition.clone(),
                commit: latest,
            },
        )?;

        let kind = T::KIND;
        match previous {
            None => {
                tracing::info!(%kind, alias = %alias, path = %path.display(), "added definition");
                changes.push(Change::Added { kind, alias });
            }
            Some(previous) if previous.definition != definition => {
                tracing::info!(%kind, alias = %alias, path = %path.display(), "updated definition");
                changes.push(Change::Updated { kind, alias });
            }
            Some(_) => {}
        }
    }

    Ok(changes)
}

/// Step 3 for one kind: delete every entry not written at `latest`.
fn purge<T: Plugin>(
    txn: &WriteTxn,
    store: &RepositoryStore,
    latest: CommitHash,
) -> Result<Vec<Change>, SyncError> {
    let definitions = store.definitions::<T>();

    let mut stale = Vec::new();
    definitions.for_each(txn, |alias, definition| {
        if definition.commit != latest {
            stale.push(alias.to_owned());
        }
        Ok(ControlFlow::Continue(()))
    })?;

    let kind = T::KIND;
    let mut changes = Vec::with_capacity(stale.len());
    for alias in stale {
        definitions.delete(txn, &alias)?;
        tracing::info!(%kind, alias = %alias, repository = %store.alias(), "purged stale definition");
        changes.push(Change::Removed { kind, alias });
    }
    Ok(changes)
}

/// Read every definition of kind `T` under `<tree>/<kind dir>`.
///
/// Files are visited in name order. Hidden entries and subdirectories are
/// skipped; a missing kind directory yields nothing. When two files declare
/// the same alias the later file wins.
pub fn load_definitions<T: Plugin>(
    tree: &Path,
    cancel: &Cancellation,
) -> Result<Vec<(PathBuf, T)>, SyncError> {
    let dir = tree.join(T::KIND.dir_name());
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "no definition directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(io_err(&dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_file = entry
            .file_type()
            .map_err(|e| io_err(&path, e))?
            .is_file();
        if hidden || !is_file {
            tracing::debug!(path = %path.display(), "skipping");
            continue;
        }
        files.push(path);
    }
    files.sort();

    let mut definitions: Vec<(PathBuf, T)> = Vec::with_capacity(files.len());
    for path in files {
        cancel.check()?;
        let definition = decode_definition::<T>(&path)?;
        if let Some(index) = definitions
            .iter()
            .position(|(_, existing)| existing.alias() == definition.alias())
        {
            tracing::warn!(
                alias = definition.alias(),
                first = %definitions[index].0.display(),
                second = %path.display(),
                "alias defined twice; keeping the later file"
            );
            definitions.remove(index);
        }
        definitions.push((path, definition));
    }
    Ok(definitions)
}

/// Decode one file: a mapping whose `vm` / `subnet` key holds the record.
pub fn decode_definition<T: Plugin>(path: &Path) -> Result<T, SyncError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let decode = |source| SyncError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let key = T::KIND.file_key();
    let mut document: Mapping = serde_yaml::from_str(&content).map_err(decode)?;
    let record = document
        .remove(key)
        .ok_or(SyncError::MissingKey {
            path: path.to_path_buf(),
            key,
        })?;
    let definition: T = serde_yaml::from_value(record).map_err(decode)?;

    let alias = definition.alias();
    if alias.is_empty() {
        return Err(SyncError::MissingKey {
            path: path.to_path_buf(),
            key: "alias",
        });
    }
    if !valid_plugin_alias(alias) {
        return Err(SyncError::InvalidAlias {
            path: path.to_path_buf(),
            alias: alias.to_owned(),
        });
    }
    Ok(definition)
}
