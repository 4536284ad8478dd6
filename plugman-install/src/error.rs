//! Error types for plugman-install.

use std::path::PathBuf;

use thiserror::Error;

use plugman_core::CoreError;

/// All errors that can arise while installing, removing or upgrading VMs.
#[derive(Debug, Error)]
pub enum InstallError {
    /// An error from the store or the data model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact could not be downloaded.
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The definition names a URL scheme the fetcher does not handle.
    #[error("unsupported artifact url {url:?}")]
    UnsupportedUrl { url: String },

    /// A VM id that cannot be used as a file name.
    #[error("vm id {id:?} cannot be used as a plugin file name")]
    InvalidVmId { id: String },

    /// The definition has no download URL.
    #[error("vm {alias} does not publish an artifact url")]
    MissingArtifact { alias: String },

    /// The downloaded artifact does not hash to the published checksum.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The post-install script exited unsuccessfully.
    #[error("install script {script} failed with {status}")]
    Script {
        script: String,
        status: std::process::ExitStatus,
    },

    /// The admin API rejected a request.
    #[error(transparent)]
    Admin(#[from] AdminError),
}

/// Errors from the node's admin API.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Nothing is listening at the endpoint.
    #[error("node at {endpoint} is offline")]
    Offline { endpoint: String },

    /// Any other transport or HTTP-status failure.
    #[error("admin api request {method} to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        method: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The response body was not a JSON-RPC response.
    #[error("admin api returned an unreadable response to {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: std::io::Error,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("admin api {method} returned error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
}

impl AdminError {
    pub fn is_offline(&self) -> bool {
        matches!(self, AdminError::Offline { .. })
    }
}

/// Convenience constructor for [`InstallError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> InstallError {
    InstallError::Io {
        path: path.into(),
        source,
    }
}
