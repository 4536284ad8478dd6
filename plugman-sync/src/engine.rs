//! Sync/reconciliation engine.
//!
//! ## Per-repository pass
//!
//! 1. Read the repository's [`SourceInfo`].
//! 2. Bring the working tree to the branch tip through the [`GitMirror`].
//! 3. Stop if the tip is the checkpointed commit.
//! 4. Load and write definitions, then purge stale ones, in one write
//!    transaction (aborted instead of committed on a dry run).
//! 5. Reinstall installed VMs of this repository whose version went up.
//! 6. Checkpoint the new commit.
//!
//! A crash anywhere before step 6 leaves the old checkpoint in place; the
//! next run repeats the pass with the same result.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use plugman_core::{CommitHash, Credentials, KvStore, RepoAlias, SourceInfo, SourceList};
use plugman_install::{upgrade_repository, Installer, UpgradeReport};

use crate::error::SyncError;
use crate::git::GitMirror;
use crate::reconcile::{reconcile, Change};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between the caller and a pass.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(SyncError::Cancelled)` once [`Cancellation::cancel`] was called.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOutcome {
    /// The branch tip equals the checkpoint; nothing was touched.
    UpToDate,
    Synced {
        changes: Vec<Change>,
        /// Installed VMs reinstalled because their version went up.
        rebuilt: Vec<UpgradeReport>,
    },
}

/// Result of one repository's pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReport {
    pub alias: RepoAlias,
    pub previous: CommitHash,
    pub latest: CommitHash,
    /// Changes were computed and then rolled back.
    pub dry_run: bool,
    pub outcome: RepositoryOutcome,
}

/// Result of a multi-repository pass.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub reports: Vec<RepositoryReport>,
    pub failures: Vec<(RepoAlias, SyncError)>,
}

impl SyncSummary {
    /// `Err(SyncError::RepositoriesFailed)` naming every failed repository,
    /// otherwise the reports.
    pub fn into_result(self) -> Result<Vec<RepositoryReport>, SyncError> {
        if self.failures.is_empty() {
            return Ok(self.reports);
        }
        Err(SyncError::RepositoriesFailed {
            failed: self
                .failures
                .iter()
                .map(|(alias, _)| alias.to_string())
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs reconciliation passes against one store.
pub struct SyncEngine<'a> {
    store: &'a KvStore,
    git: &'a dyn GitMirror,
    installer: &'a dyn Installer,
    repositories_dir: PathBuf,
    credentials: Option<Credentials>,
    cancel: Cancellation,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a KvStore,
        git: &'a dyn GitMirror,
        installer: &'a dyn Installer,
        repositories_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            git,
            installer,
            repositories_dir: repositories_dir.into(),
            credentials: None,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one pass for `alias`.
    pub fn sync_repository(
        &self,
        alias: &RepoAlias,
        dry_run: bool,
    ) -> Result<RepositoryReport, SyncError> {
        self.cancel.check()?;
        let sources = SourceList::new();
        let source: SourceInfo = self.store.view(|txn| sources.get(txn, alias))?;

        let tree = alias.working_tree(&self.repositories_dir);
        let latest = self
            .git
            .sync(&source.url, &tree, &source.branch, self.credentials.as_ref())
            .map_err(|source| SyncError::Git {
                alias: alias.clone(),
                source,
            })?;

        let report = |outcome| RepositoryReport {
            alias: alias.clone(),
            previous: source.commit,
            latest,
            dry_run,
            outcome,
        };

        if latest == source.commit {
            tracing::info!(repository = %alias, commit = %latest.short(), "already up to date");
            return Ok(report(RepositoryOutcome::UpToDate));
        }
        tracing::info!(
            repository = %alias,
            from = %source.commit.short(),
            to = %latest.short(),
            "reconciling"
        );

        let txn = self.store.write()?;
        let changes = match reconcile(&txn, alias, &tree, latest, &self.cancel) {
            Ok(changes) => changes,
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort reconcile transaction");
                }
                return Err(err);
            }
        };

        if dry_run {
            txn.abort()?;
            tracing::info!(repository = %alias, changes = changes.len(), "[dry-run] rolled back");
            return Ok(report(RepositoryOutcome::Synced {
                changes,
                rebuilt: Vec::new(),
            }));
        }
        txn.commit()?;

        let rebuilt: Vec<_> = upgrade_repository(self.store, self.installer, alias)?
            .into_iter()
            .filter(UpgradeReport::upgraded)
            .collect();

        self.cancel.check()?;
        self.store
            .update(|txn| sources.checkpoint(txn, alias, latest))?;
        tracing::info!(repository = %alias, commit = %latest.short(), "checkpointed");

        Ok(report(RepositoryOutcome::Synced { changes, rebuilt }))
    }

    /// Run a pass for every tracked repository, in source-list order.
    ///
    /// A failing repository does not stop the others; failures are collected
    /// in the summary. Cancellation stops the loop immediately.
    pub fn sync_all(&self, dry_run: bool) -> Result<SyncSummary, SyncError> {
        let sources = self.store.view(|txn| SourceList::new().list(txn))?;
        let mut summary = SyncSummary::default();

        for source in sources {
            match self.sync_repository(&source.alias, dry_run) {
                Ok(report) => summary.reports.push(report),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) => {
                    tracing::error!(repository = %source.alias, error = %err, "sync failed");
                    summary.failures.push((source.alias, err));
                }
            }
        }
        Ok(summary)
    }
}
