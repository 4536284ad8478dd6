//! Shared sync entrypoint used by `update` and bootstrap.

use plugman_core::RepoAlias;

use crate::engine::{SyncEngine, SyncSummary};
use crate::error::SyncError;

/// Scope for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every tracked repository.
    All,
    /// A single tracked repository.
    Repository(RepoAlias),
}

/// Run the engine over `scope`.
///
/// A single-repository scope fails directly with that repository's error;
/// the multi-repository scope collects failures in the summary.
pub fn run(engine: &SyncEngine<'_>, scope: SyncScope, dry_run: bool) -> Result<SyncSummary, SyncError> {
    match scope {
        SyncScope::All => engine.sync_all(dry_run),
        SyncScope::Repository(alias) => Ok(SyncSummary {
            reports: vec![engine.sync_repository(&alias, dry_run)?],
            failures: Vec::new(),
        }),
    }
}
