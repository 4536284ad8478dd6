//! Error types for plugman-sync.

use std::path::PathBuf;

use thiserror::Error;

use plugman_core::{CoreError, RepoAlias};
use plugman_install::InstallError;

/// Failures of the git mirror.
#[derive(Debug, Error)]
pub enum GitError {
    /// The remote rejected the credentials (or demanded some).
    #[error("authentication failed for {url}: {source}")]
    Auth {
        url: String,
        #[source]
        source: git2::Error,
    },

    /// Transport-level failure talking to the remote.
    #[error("network error talking to {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: git2::Error,
    },

    /// The tracked branch does not exist on the remote.
    #[error("branch {branch} not found at {url}")]
    RefNotFound { url: String, branch: String },

    /// Any other libgit2 failure, with the working tree involved.
    #[error("git error in {path}: {source}")]
    Other {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can arise from a sync pass or the [`crate::Manager`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to sync {alias}: {source}")]
    Git {
        alias: RepoAlias,
        #[source]
        source: GitError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A definition file is not valid YAML of the expected shape.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A definition file lacks a required key.
    #[error("{path} is missing required key {key:?}")]
    MissingKey { path: PathBuf, key: &'static str },

    /// A definition declares an alias that cannot be resolved by name.
    #[error("{path} declares invalid alias {alias:?}")]
    InvalidAlias { path: PathBuf, alias: String },

    /// The pass was cancelled before its checkpoint was written.
    #[error("sync cancelled")]
    Cancelled,

    /// At least one repository failed; the others were still processed.
    #[error("failed to sync {} repositories: {}", .failed.len(), .failed.join(", "))]
    RepositoriesFailed { failed: Vec<String> },

    /// The configured default repository cannot be removed.
    #[error("can't remove {alias} (required repository)")]
    RequiredRepository { alias: RepoAlias },

    /// `add-repository` for an alias that is already tracked.
    #[error("repository {alias} is already tracked")]
    AlreadyTracked { alias: RepoAlias },
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
