//! Artifact download and checksum verification.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{io_err, InstallError};

/// Retrieves the artifact at `url` into `dest`.
pub trait Fetch {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), InstallError>;
}

/// `http://` and `https://` through a `ureq` agent; `file://` by local copy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), InstallError> {
        if let Some(source) = url.strip_prefix("file://") {
            std::fs::copy(source, dest).map_err(|e| io_err(source, e))?;
            tracing::debug!(url, dest = %dest.display(), "copied local artifact");
            return Ok(());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(InstallError::UnsupportedUrl {
                url: url.to_owned(),
            });
        }

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|source| InstallError::Download {
                url: url.to_owned(),
                source: Box::new(source),
            })?;

        let mut file = File::create(dest).map_err(|e| io_err(dest, e))?;
        let written =
            std::io::copy(&mut response.into_reader(), &mut file).map_err(|e| io_err(dest, e))?;
        file.flush().map_err(|e| io_err(dest, e))?;
        tracing::debug!(url, bytes = written, dest = %dest.display(), "downloaded artifact");
        Ok(())
    }
}

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String, InstallError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Fail with [`InstallError::ChecksumMismatch`] unless `path` hashes to
/// `expected` (case-insensitive hex).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), InstallError> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(InstallError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_owned(),
            actual,
        });
    }
    Ok(())
}
