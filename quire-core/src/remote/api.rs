//! HTTP client for the remote contents API.
//!
//! Endpoints used:
//! - `GET    /repos/{owner}/{repo}` - liveness probe
//! - `GET    /repos/{owner}/{repo}/contents/{path}?ref={ref}` - file or directory
//! - `PUT    /repos/{owner}/{repo}/contents/{path}` - create/update, `sha` precondition
//! - `DELETE /repos/{owner}/{repo}/contents/{path}` - delete, `sha` required
//! - `GET    /repos/{owner}/{repo}/commits?path=&sha=&per_page=` - history
//!
//! The API reports a stale `sha` only through status codes and message text.
//! [`translate_failure`] is the one place that text is inspected; everything
//! above this module sees a typed [`StorageError::Conflict`].

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::codec::encode_content;
use crate::error::StorageError;
use crate::model::HistoryEntry;

/// Media type required on every request.
pub const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// Default API host.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// A file object returned by the contents endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentFile {
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// Base64 body. Absent for very large files.
    #[serde(default)]
    pub content: Option<String>,
}

/// A directory entry returned by the contents endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DirEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The contents endpoint returns an array for directories and an object for
/// files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Contents {
    Directory(Vec<DirEntry>),
    File(ContentFile),
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
    #[serde(default)]
    parents: Vec<CommitRef>,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

/// Whether a failed request was reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Read,
    Write,
}

/// Authenticated client bound to one repository and branch.
#[derive(Debug, Clone)]
pub(crate) struct ContentsClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl ContentsClient {
    pub fn new(api_url: &str, owner: &str, repo: &str, branch: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// True if this client targets the same repository and branch.
    pub fn same_target(&self, other: &ContentsClient) -> bool {
        self.api_url == other.api_url
            && self.owner == other.owner
            && self.repo == other.repo
            && self.branch == other.branch
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/contents", self.repo_url())
        } else {
            format!("{}/contents/{}", self.repo_url(), encode_path(path))
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", ACCEPT_HEADER)
            .header("User-Agent", concat!("quire/", env!("CARGO_PKG_VERSION")))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }

    /// Returns true if the repository answers with a success status.
    pub async fn ping(&self) -> bool {
        match self.send(self.http.get(self.repo_url())).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Fetches a path on the configured branch. `Ok(None)` if absent.
    pub async fn get_contents(&self, path: &str) -> Result<Option<Contents>, StorageError> {
        let branch = self.branch.clone();
        self.get_contents_at(path, &branch).await
    }

    /// Fetches a path at any ref (branch, tag or commit sha).
    pub async fn get_contents_at(
        &self,
        path: &str,
        reference: &str,
    ) -> Result<Option<Contents>, StorageError> {
        tracing::debug!("GET contents {} @ {}", path, reference);
        let request = self
            .http
            .get(self.contents_url(path))
            .query(&[("ref", reference)]);
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            let contents = response
                .json::<Contents>()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            return Ok(Some(contents));
        }

        match translate_failure(path, Operation::Read, status, &read_message(response).await) {
            StorageError::NotFound(_) => Ok(None),
            e => Err(e),
        }
    }

    /// Creates or updates a file. `sha` is the precondition: `None` creates
    /// only if absent, `Some` requires it to match the current blob.
    ///
    /// Returns the new blob sha.
    pub async fn put_contents(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<String, StorageError> {
        tracing::debug!("PUT contents {} (sha: {:?})", path, sha);
        let body = PutBody {
            message,
            content: encode_content(content),
            branch: &self.branch,
            sha,
        };
        let response = self
            .send(self.http.put(self.contents_url(path)).json(&body))
            .await?;
        let status = response.status();

        if status.is_success() {
            let put: PutResponse = response
                .json()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            return Ok(put.content.sha);
        }

        Err(translate_failure(
            path,
            Operation::Write,
            status,
            &read_message(response).await,
        ))
    }

    /// Deletes a file whose current blob sha is `sha`.
    pub async fn delete_contents(
        &self,
        path: &str,
        message: &str,
        sha: &str,
    ) -> Result<(), StorageError> {
        tracing::debug!("DELETE contents {} (sha: {})", path, sha);
        let body = DeleteBody {
            message,
            sha,
            branch: &self.branch,
        };
        let response = self
            .send(self.http.delete(self.contents_url(path)).json(&body))
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        Err(translate_failure(
            path,
            Operation::Write,
            status,
            &read_message(response).await,
        ))
    }

    /// Lists commits touching `path` on the configured branch, newest-first.
    pub async fn list_commits(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let per_page = limit.clamp(1, 100).to_string();
        let request = self.http.get(format!("{}/commits", self.repo_url())).query(&[
            ("path", path),
            ("sha", self.branch.as_str()),
            ("per_page", per_page.as_str()),
        ]);
        let response = self.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            return match translate_failure(
                path,
                Operation::Read,
                status,
                &read_message(response).await,
            ) {
                StorageError::NotFound(_) => Ok(Vec::new()),
                e => Err(e),
            };
        }

        let commits: Vec<CommitItem> = response
            .json()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let mut entries: Vec<HistoryEntry> = commits
            .into_iter()
            .filter_map(|item| {
                let author = item.commit.author?;
                Some(HistoryEntry {
                    id: item.sha,
                    message: item.commit.message,
                    author: author.name,
                    timestamp: author.date,
                    parent_id: item.parents.into_iter().next().map(|p| p.sha),
                    path: Some(path.to_string()),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}

async fn read_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ApiMessage>(&text)
        .map(|m| m.message)
        .unwrap_or(text)
}

/// Maps a failed response onto the error taxonomy.
///
/// A stale or missing `sha` arrives as 409 ("does not match") or 422
/// ("\"sha\" wasn't supplied"). Any write failure that could be either is
/// reported as a conflict rather than guessing a more specific cause.
/// Reads answering 409 come from an empty repository and mean "absent".
/// A 403 is a credential problem unless it reports a rate limit or a blob
/// over the 1 MB contents limit.
pub(crate) fn translate_failure(
    path: &str,
    operation: Operation,
    status: StatusCode,
    message: &str,
) -> StorageError {
    let lower = message.to_lowercase();
    match (status, operation) {
        (StatusCode::UNAUTHORIZED, _) => StorageError::AuthFailure(message.to_string()),
        (StatusCode::FORBIDDEN, _)
            if lower.contains("too large") || lower.contains("too_large") =>
        {
            StorageError::Transport(format!("{}: {}", status, message))
        }
        (StatusCode::FORBIDDEN, _) if !lower.contains("rate limit") => {
            StorageError::AuthFailure(message.to_string())
        }
        (StatusCode::NOT_FOUND, _) => StorageError::NotFound(path.to_string()),
        (StatusCode::CONFLICT, Operation::Read) => StorageError::NotFound(path.to_string()),
        (StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY, Operation::Write) => {
            StorageError::conflict(path, message)
        }
        _ if operation == Operation::Write
            && (lower.contains("does not match") || lower.contains("sha")) =>
        {
            StorageError::conflict(path, message)
        }
        _ => StorageError::Transport(format!("{}: {}", status, message)),
    }
}

/// Percent-encodes each path segment, keeping the separators.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
