//! Git mirror: clone or fetch a tracked branch into a local working tree.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, ErrorClass, ErrorCode, FetchOptions, RemoteCallbacks, Repository, ResetType};

use plugman_core::{CommitHash, Credentials};

use crate::error::GitError;

/// Brings a local working tree to the remote tip of a branch.
pub trait GitMirror {
    /// Clone `url` into `path` at `branch` when `path` holds no repository,
    /// otherwise fetch and hard-reset the existing tree to the branch tip.
    /// Returns the resulting head commit.
    fn sync(
        &self,
        url: &str,
        path: &Path,
        branch: &str,
        credentials: Option<&Credentials>,
    ) -> Result<CommitHash, GitError>;
}

/// [`GitMirror`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Mirror;

impl GitMirror for Git2Mirror {
    fn sync(
        &self,
        url: &str,
        path: &Path,
        branch: &str,
        credentials: Option<&Credentials>,
    ) -> Result<CommitHash, GitError> {
        match Repository::open(path) {
            Ok(repo) => fetch_and_reset(&repo, url, path, branch, credentials),
            Err(e) if e.code() == ErrorCode::NotFound => clone(url, path, branch, credentials),
            Err(source) => Err(GitError::Other {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn clone(
    url: &str,
    path: &Path,
    branch: &str,
    credentials: Option<&Credentials>,
) -> Result<CommitHash, GitError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| GitError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let existed = path.exists();
    tracing::info!(url, branch, path = %path.display(), "cloning");

    let cloned = RepoBuilder::new()
        .branch(branch)
        .fetch_options(fetch_options(credentials))
        .clone(url, path);
    let repo = match cloned {
        Ok(repo) => repo,
        Err(err) => {
            // Leave no half-written tree behind; the next run clones again.
            if !existed && path.exists() {
                let _ = std::fs::remove_dir_all(path);
            }
            return Err(transport(url, branch, err));
        }
    };

    let head = repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(|source| other(path, source))?;
    commit_hash(path, head.id())
}

fn fetch_and_reset(
    repo: &Repository,
    url: &str,
    path: &Path,
    branch: &str,
    credentials: Option<&Credentials>,
) -> Result<CommitHash, GitError> {
    let tracking = format!("refs/remotes/origin/{branch}");

    // Drop the old tracking ref so a branch deleted upstream is detected
    // instead of silently resetting to the stale tip.
    match repo.find_reference(&tracking) {
        Ok(mut reference) => reference.delete().map_err(|source| other(path, source))?,
        Err(e) if e.code() == ErrorCode::NotFound => {}
        Err(source) => return Err(other(path, source)),
    }

    tracing::info!(url, branch, path = %path.display(), "fetching");
    let mut remote = repo
        .remote_anonymous(url)
        .map_err(|source| other(path, source))?;
    let refspec = format!("+refs/heads/{branch}:{tracking}");
    remote
        .fetch(&[refspec.as_str()], Some(&mut fetch_options(credentials)), None)
        .map_err(|err| transport(url, branch, err))?;

    let reference = match repo.find_reference(&tracking) {
        Ok(reference) => reference,
        Err(e) if e.code() == ErrorCode::NotFound => {
            return Err(GitError::RefNotFound {
                url: url.to_owned(),
                branch: branch.to_owned(),
            })
        }
        Err(source) => return Err(other(path, source)),
    };
    let commit = reference
        .peel_to_commit()
        .map_err(|source| other(path, source))?;

    repo.set_head_detached(commit.id())
        .map_err(|source| other(path, source))?;
    repo.reset(
        commit.as_object(),
        ResetType::Hard,
        Some(CheckoutBuilder::new().force()),
    )
    .map_err(|source| other(path, source))?;

    commit_hash(path, commit.id())
}

fn fetch_options(credentials: Option<&Credentials>) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(credentials) = credentials.cloned() {
        let mut attempts = 0u32;
        callbacks.credentials(move |_url, _username, allowed| {
            attempts += 1;
            // libgit2 keeps asking while the remote keeps rejecting.
            if attempts > 1 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "credentials rejected",
                ));
            }
            if allowed.is_user_pass_plaintext() {
                Cred::userpass_plaintext(&credentials.username, &credentials.password)
            } else {
                Cred::default()
            }
        });
    }
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

/// Errors raised while talking to the remote. Anything that is neither an
/// auth failure nor a missing branch is a transport failure, whatever class
/// libgit2 gives it (a refused connection is reported as `Os`).
fn transport(url: &str, branch: &str, err: git2::Error) -> GitError {
    match (err.code(), err.class()) {
        (ErrorCode::Auth, _) => GitError::Auth {
            url: url.to_owned(),
            source: err,
        },
        (ErrorCode::NotFound, class)
            if class == ErrorClass::Reference || err.message().contains("branch") =>
        {
            GitError::RefNotFound {
                url: url.to_owned(),
                branch: branch.to_owned(),
            }
        }
        _ => GitError::Network {
            url: url.to_owned(),
            source: err,
        },
    }
}

fn other(path: &Path, source: git2::Error) -> GitError {
    GitError::Other {
        path: path.to_path_buf(),
        source,
    }
}

fn commit_hash(path: &Path, oid: git2::Oid) -> Result<CommitHash, GitError> {
    CommitHash::from_slice(oid.as_bytes()).ok_or_else(|| {
        other(
            path,
            git2::Error::new(
                ErrorCode::Invalid,
                ErrorClass::Object,
                format!("object id {oid} is not a 20-byte sha1"),
            ),
        )
    })
}
