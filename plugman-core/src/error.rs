//! Error types for plugman-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from the data model, the key-value store and
/// configuration loading.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the file path and serde_yaml line context.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A stored value could not be encoded or decoded.
    #[error("store codec error for {namespace}/{key}: {source}")]
    Codec {
        namespace: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// No value is stored under `key` in `namespace`.
    #[error("{key} not found in {namespace}")]
    NotFound { namespace: String, key: String },

    /// A bare alias is defined by more than one repository.
    #[error(
        "more than one match found for {alias}; specify the fully qualified name \
         (matches: {})",
        .candidates.join(", ")
    )]
    AmbiguousAlias {
        alias: String,
        candidates: Vec<String>,
    },

    /// Repository alias is not in `organization/repository` form.
    #[error("{alias} is not a valid alias (must be in the form of organization/repository)")]
    InvalidAlias { alias: String },

    /// Plugin name is neither a bare alias nor `organization/repository:alias`.
    #[error("{name} is not a valid plugin name (expected <alias> or <organization>/<repository>:<alias>)")]
    InvalidName { name: String },

    /// A commit hash literal was not 40 hex characters.
    #[error("invalid commit hash {value:?}")]
    InvalidCommit { value: String },

    /// A version literal was not `major.minor.patch`.
    #[error("invalid version {value:?} (expected major.minor.patch)")]
    InvalidVersion { value: String },

    /// The on-disk database was written by an incompatible schema.
    #[error("database schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },

    /// `dirs::home_dir()` returned `None`, so `~/.plugman/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl CoreError {
    /// True for [`CoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
