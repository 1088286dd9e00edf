//! Push and pull against the configured remote.

use std::cell::Cell;

use git2::{
    Cred, ErrorClass, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks, Repository,
};
use serde::Serialize;

use crate::error::StorageError;

/// Remote repository an embedded repository exchanges commits with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemote {
    pub url: String,
    pub name: String,
    /// Access token sent as the password of an HTTP basic credential.
    pub token: Option<String>,
}

impl GitRemote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: "origin".to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// What a pull did to the local branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullOutcome {
    /// The remote has no such branch yet.
    NothingUpstream,
    UpToDate,
    /// Local commits the remote does not have yet. Nothing changed.
    AheadOfRemote,
    FastForwarded,
    /// The local branch held only its initial commit and now points at the
    /// remote history.
    Adopted,
}

impl std::fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PullOutcome::NothingUpstream => "remote branch does not exist yet",
            PullOutcome::UpToDate => "already up to date",
            PullOutcome::AheadOfRemote => "local branch is ahead of the remote",
            PullOutcome::FastForwarded => "fast-forwarded",
            PullOutcome::Adopted => "adopted remote history",
        };
        f.write_str(s)
    }
}

/// Credentials callback offering the token once.
///
/// libgit2 keeps asking while the server rejects a credential, so a second
/// request is answered with an auth error instead.
fn callbacks(token: Option<&str>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = token {
        let attempts = Cell::new(0u8);
        callbacks.credentials(move |_url, username, _allowed| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > 1 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "remote rejected the access token",
                ));
            }
            Cred::userpass_plaintext(username.unwrap_or("x-access-token"), token)
        });
    }
    callbacks
}

/// Makes sure `remote` is registered in `repo` with the configured URL.
pub(crate) fn ensure_remote(repo: &Repository, remote: &GitRemote) -> Result<(), StorageError> {
    match repo.find_remote(&remote.name) {
        Ok(existing) if existing.url() == Some(remote.url.as_str()) => Ok(()),
        Ok(_) => {
            repo.remote_set_url(&remote.name, &remote.url)?;
            Ok(())
        }
        Err(e) if e.code() == ErrorCode::NotFound => {
            repo.remote(&remote.name, &remote.url)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn translate(e: git2::Error, branch: &str) -> StorageError {
    match e.code() {
        ErrorCode::NotFastForward => StorageError::conflict(
            branch,
            "the remote branch has commits that are not in the local branch; pull first",
        ),
        ErrorCode::Auth => StorageError::AuthFailure(e.message().to_string()),
        _ => match e.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Os => {
                StorageError::Transport(e.message().to_string())
            }
            _ => StorageError::Git(e),
        },
    }
}

/// Pushes `branch` to the remote branch of the same name.
pub(crate) fn push(
    repo: &Repository,
    remote: &GitRemote,
    branch: &str,
) -> Result<(), StorageError> {
    let refname = format!("refs/heads/{}", branch);
    let mut handle = repo.find_remote(&remote.name)?;

    let rejected = std::cell::RefCell::new(None);
    let mut cbs = callbacks(remote.token.as_deref());
    cbs.push_update_reference(|name, status| {
        if let Some(message) = status {
            *rejected.borrow_mut() = Some(format!("{}: {}", name, message));
        }
        Ok(())
    });

    let mut options = PushOptions::new();
    options.remote_callbacks(cbs);

    tracing::debug!("Pushing {} to {}", refname, remote.url);
    handle
        .push(&[format!("{0}:{0}", refname)], Some(&mut options))
        .map_err(|e| translate(e, branch))?;

    if let Some(message) = rejected.borrow_mut().take() {
        return Err(StorageError::conflict(branch, message));
    }
    tracing::info!("Pushed {} to {}", branch, remote.name);
    Ok(())
}

/// Fetches `branch` and integrates it without merging.
pub(crate) fn pull(
    repo: &Repository,
    remote: &GitRemote,
    branch: &str,
) -> Result<PullOutcome, StorageError> {
    let tracking = format!("refs/remotes/{}/{}", remote.name, branch);
    let mut handle = repo.find_remote(&remote.name)?;

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks(remote.token.as_deref()));

    tracing::debug!("Fetching {} from {}", branch, remote.url);
    handle
        .fetch(
            &[format!("+refs/heads/{}:{}", branch, tracking)],
            Some(&mut options),
            None,
        )
        .map_err(|e| translate(e, branch))?;

    let remote_oid = match repo.refname_to_id(&tracking) {
        Ok(oid) => oid,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(PullOutcome::NothingUpstream),
        Err(e) => return Err(e.into()),
    };

    let local_ref = format!("refs/heads/{}", branch);
    let local = repo.find_reference(&local_ref)?.peel_to_commit()?;
    let local_oid = local.id();

    if local_oid == remote_oid {
        return Ok(PullOutcome::UpToDate);
    }
    if repo.graph_descendant_of(local_oid, remote_oid)? {
        return Ok(PullOutcome::AheadOfRemote);
    }
    if repo.graph_descendant_of(remote_oid, local_oid)? {
        repo.reference(&local_ref, remote_oid, true, "pull: fast-forward")?;
        tracing::info!("Fast-forwarded {} to {}", branch, remote_oid);
        return Ok(PullOutcome::FastForwarded);
    }
    if local.parent_count() == 0 && local.tree()?.is_empty() {
        repo.reference(&local_ref, remote_oid, true, "pull: adopt remote history")?;
        tracing::info!("Adopted remote history for {}", branch);
        return Ok(PullOutcome::Adopted);
    }

    Err(StorageError::conflict(
        branch,
        "local and remote histories have diverged",
    ))
}
