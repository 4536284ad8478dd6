//! The list of tracked source repositories.

use chrono::Utc;

use crate::error::CoreError;
use crate::kv::{KeyValue, KeyValueMut, Namespace, Storage};
use crate::types::{CommitHash, RepoAlias, SourceInfo};

/// Tracked repositories, keyed by `organization/repository`.
#[derive(Debug, Clone)]
pub struct SourceList {
    sources: Storage<SourceInfo>,
}

impl Default for SourceList {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceList {
    pub fn new() -> Self {
        Self {
            sources: Storage::new(Namespace::root("sources")),
        }
    }

    pub fn get(&self, kv: &impl KeyValue, alias: &RepoAlias) -> Result<SourceInfo, CoreError> {
        self.sources.get(kv, &alias.to_string())
    }

    pub fn get_opt(
        &self,
        kv: &impl KeyValue,
        alias: &RepoAlias,
    ) -> Result<Option<SourceInfo>, CoreError> {
        self.sources.get_opt(kv, &alias.to_string())
    }

    pub fn contains(&self, kv: &impl KeyValue, alias: &RepoAlias) -> Result<bool, CoreError> {
        self.sources.has(kv, &alias.to_string())
    }

    /// Insert or replace a source record.
    pub fn put(&self, kv: &impl KeyValueMut, info: &SourceInfo) -> Result<(), CoreError> {
        self.sources.put(kv, &info.alias.to_string(), info)
    }

    /// Start tracking a repository at the zero commit. Returns `false` and
    /// leaves the existing record untouched if it is already tracked.
    pub fn add(&self, kv: &impl KeyValueMut, info: SourceInfo) -> Result<bool, CoreError> {
        if self.contains(kv, &info.alias)? {
            return Ok(false);
        }
        self.put(kv, &SourceInfo {
            commit: CommitHash::ZERO,
            synced_at: None,
            ..info
        })?;
        Ok(true)
    }

    pub fn remove(&self, kv: &impl KeyValueMut, alias: &RepoAlias) -> Result<(), CoreError> {
        self.sources.delete(kv, &alias.to_string())
    }

    /// All tracked repositories, ordered by alias.
    pub fn list(&self, kv: &impl KeyValue) -> Result<Vec<SourceInfo>, CoreError> {
        Ok(self
            .sources
            .entries(kv)?
            .into_iter()
            .map(|(_, info)| info)
            .collect())
    }

    /// Record that `alias` has been fully processed at `commit`.
    pub fn checkpoint(
        &self,
        kv: &impl KeyValueMut,
        alias: &RepoAlias,
        commit: CommitHash,
    ) -> Result<SourceInfo, CoreError> {
        let mut info = self.get(kv, alias)?;
        info.commit = commit;
        info.synced_at = Some(Utc::now());
        self.put(kv, &info)?;
        Ok(info)
    }
}
