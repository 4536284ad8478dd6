//! # plugman-sync
//!
//! Keeping the local store in step with the tracked git repositories.
//!
//! [`SyncEngine`] runs one reconciliation pass per repository: mirror the
//! branch, rewrite its definitions in one transaction, purge stale ones,
//! rebuild installed VMs whose version went up, and checkpoint the commit.
//! [`Manager`] wraps the engine and the install workflows behind the
//! operations the `plugman` binary exposes.

pub mod engine;
pub mod error;
pub mod git;
pub mod manager;
pub mod pipeline;
pub mod reconcile;

pub use engine::{Cancellation, RepositoryOutcome, RepositoryReport, SyncEngine, SyncSummary};
pub use error::{GitError, SyncError};
pub use git::{Git2Mirror, GitMirror};
pub use manager::{Manager, RemovedRepository};
pub use pipeline::SyncScope;
pub use reconcile::Change;
