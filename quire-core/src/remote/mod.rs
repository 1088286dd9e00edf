//! Remote versioned storage over a content-addressed REST contents API.
//!
//! Every file on the remote carries a blob sha which serves as its version
//! token. Writes are optimistic: the adapter submits the token it expects
//! the file to have, and the remote refuses the write if the file moved on.
//!
//! # Write protocol
//!
//! 1. Resolve the expected token: the caller's, else the cached one (unless
//!    `force`), else none (create semantics).
//! 2. Submit content and token.
//! 3. On success, cache and return the new token.
//! 4. On conflict without `force`, evict the cache entry and fail with
//!    [`StorageError::Conflict`]. With `force`, fetch the current token and
//!    resubmit exactly once; a second conflict is
//!    [`StorageError::RetryExhausted`].

mod api;
#[cfg(test)]
mod test_server;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::adapter::{validate_path, StorageAdapter};
use crate::codec::decode_content;
use crate::error::StorageError;
use crate::model::{
    normalize_path, split_parent, File, HistoryEntry, ListEntry, ModeInfo, StorageMode,
    WriteRequest, WriteResult,
};

pub use api::{ACCEPT_HEADER, DEFAULT_API_URL};
use api::{Contents, ContentsClient};

/// Settings for the remote adapter.
///
/// `token` is a credential and is never part of the persisted settings
/// record; callers load it separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
    pub token: String,
}

impl RemoteSettings {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: "main".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn validate(&self) -> Result<(), StorageError> {
        for (name, value) in [
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("api_url", &self.api_url),
            ("token", &self.token),
        ] {
            if value.trim().is_empty() {
                return Err(StorageError::InvalidSettings(format!(
                    "remote storage requires '{}'",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Last-observed version token per path.
///
/// Lets writes skip a round trip to learn the current token. It can go stale
/// when the remote is edited elsewhere, so it is evicted on conflict and on
/// detected remote changes.
#[derive(Debug, Default)]
struct VersionCache {
    tokens: Mutex<HashMap<String, String>>,
}

impl VersionCache {
    fn with_tokens<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut tokens)
    }

    fn get(&self, path: &str) -> Option<String> {
        self.with_tokens(|t| t.get(path).cloned())
    }

    fn set(&self, path: &str, token: &str) {
        self.with_tokens(|t| t.insert(path.to_string(), token.to_string()));
    }

    fn remove(&self, path: &str) {
        self.with_tokens(|t| t.remove(path));
    }

    fn clear(&self) {
        self.with_tokens(|t| t.clear());
    }
}

const MODE_INFO: ModeInfo = ModeInfo {
    mode: StorageMode::Github,
    name: "GitHub repository",
    description: "Files are stored in a remote repository through its contents API.",
    requires_network: true,
    supports_history: true,
    supports_branches: false,
    supports_export: false,
    capabilities: &[
        "sync across devices",
        "full commit history",
        "conflict detection with version tokens",
    ],
    limitations: &[
        "requires network access",
        "requires an access token",
        "subject to API rate limits",
    ],
};

/// Adapter for a remote repository exposed through a contents API.
#[derive(Debug, Default)]
pub struct RemoteVersionedAdapter {
    client: Option<ContentsClient>,
    cache: VersionCache,
}

impl RemoteVersionedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&ContentsClient, StorageError> {
        self.client.as_ref().ok_or(StorageError::NotConfigured)
    }

    /// Returns the cached token for `path`, if any.
    pub fn cached_token(&self, path: &str) -> Option<String> {
        self.cache.get(&normalize_path(path))
    }

    /// Evicts one cache entry, or the whole cache when `path` is `None`.
    pub fn clear_cache(&self, path: Option<&str>) {
        match path {
            Some(p) => self.cache.remove(&normalize_path(p)),
            None => self.cache.clear(),
        }
    }

    /// Reads the content of `path` as of `commit` without touching the cache.
    pub async fn get_file_at_commit(
        &self,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>, StorageError> {
        let path = validate_path(path)?;
        match self.client()?.get_contents_at(&path, commit).await? {
            Some(Contents::File(file)) => {
                let encoded = file.content.ok_or_else(|| {
                    StorageError::Transport(format!("{} has no inline content", path))
                })?;
                decode_content(&encoded).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Byte size of `path` as of `commit` without touching the cache.
    pub async fn get_file_size_at_commit(
        &self,
        path: &str,
        commit: &str,
    ) -> Result<Option<u64>, StorageError> {
        let path = validate_path(path)?;
        match self.client()?.get_contents_at(&path, commit).await? {
            Some(Contents::File(file)) => Ok(Some(file.size)),
            _ => Ok(None),
        }
    }

    /// Returns true if the remote token of `path` differs from the cached one.
    ///
    /// Reads the parent directory listing, which carries each entry's sha but
    /// no content. A path that was never observed reports no change. A
    /// detected change evicts the cache entry.
    pub async fn has_remote_changes(&self, path: &str) -> Result<bool, StorageError> {
        let path = validate_path(path)?;
        let client = self.client()?;
        let Some(cached) = self.cache.get(&path) else {
            return Ok(false);
        };

        let current = self.listed_sha(client, &path).await?;
        let changed = current.as_deref() != Some(cached.as_str());
        if changed {
            tracing::info!("Remote change detected for {}", path);
            self.cache.remove(&path);
        }
        Ok(changed)
    }

    /// Returns true if the remote token of `path` is no longer `token`.
    /// Same lightweight listing as [`has_remote_changes`](Self::has_remote_changes),
    /// for callers that kept the token themselves.
    pub async fn has_changed_since(&self, path: &str, token: &str) -> Result<bool, StorageError> {
        let path = validate_path(path)?;
        let current = self.listed_sha(self.client()?, &path).await?;
        Ok(current.as_deref() != Some(token))
    }

    async fn listed_sha(
        &self,
        client: &ContentsClient,
        path: &str,
    ) -> Result<Option<String>, StorageError> {
        let (parent, name) = split_parent(path);
        match client.get_contents(parent).await? {
            Some(Contents::Directory(entries)) => Ok(entries
                .into_iter()
                .find(|e| e.name == name && e.kind == "file")
                .map(|e| e.sha)),
            _ => Ok(None),
        }
    }

    /// Current remote token of `path`, bypassing the cache.
    async fn current_token(
        &self,
        client: &ContentsClient,
        path: &str,
    ) -> Result<Option<String>, StorageError> {
        match client.get_contents(path).await? {
            Some(Contents::File(file)) => Ok(Some(file.sha)),
            _ => Ok(None),
        }
    }

    async fn retry_with_current_token(
        &self,
        client: &ContentsClient,
        path: &str,
        request: &WriteRequest,
    ) -> Result<String, StorageError> {
        let current = self.current_token(client, path).await?;
        tracing::debug!("Retrying {} with current token {:?}", path, current);

        match client
            .put_contents(path, &request.content, &request.message, current.as_deref())
            .await
        {
            Ok(sha) => Ok(sha),
            Err(e) if e.is_conflict() => {
                self.cache.remove(path);
                Err(StorageError::RetryExhausted {
                    path: path.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl StorageAdapter for RemoteVersionedAdapter {
    type Settings = RemoteSettings;

    async fn configure(&mut self, settings: RemoteSettings) -> Result<(), StorageError> {
        settings.validate()?;
        let client = ContentsClient::new(
            &settings.api_url,
            &settings.owner,
            &settings.repo,
            &settings.branch,
            &settings.token,
        );

        if let Some(existing) = &self.client {
            if !existing.same_target(&client) {
                self.cache.clear();
            }
        }

        tracing::info!(
            "Configured remote storage {}/{} on branch {}",
            settings.owner,
            settings.repo,
            client.branch()
        );
        self.client = Some(client);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn get_file(&self, path: &str) -> Result<Option<File>, StorageError> {
        let path = validate_path(path)?;
        let client = self.client()?;

        match client.get_contents(&path).await? {
            Some(Contents::File(file)) => {
                let encoded = file.content.ok_or_else(|| {
                    StorageError::Transport(format!("{} has no inline content", path))
                })?;
                let content = decode_content(&encoded)?;
                self.cache.set(&path, &file.sha);
                Ok(Some(File {
                    path,
                    content,
                    version_token: file.sha,
                }))
            }
            Some(Contents::Directory(_)) | None => Ok(None),
        }
    }

    async fn put_file(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        let path = validate_path(&request.path)?;
        let client = self.client()?;

        let expected = match &request.expected_version_token {
            Some(token) => Some(token.clone()),
            None if !request.force => self.cache.get(&path),
            None => None,
        };

        let result = client
            .put_contents(&path, &request.content, &request.message, expected.as_deref())
            .await;

        let sha = match result {
            Ok(sha) => sha,
            Err(e) if e.is_conflict() && request.force => {
                tracing::warn!("Conflict writing {}, forcing with current token", path);
                self.retry_with_current_token(client, &path, &request)
                    .await?
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!("Conflict writing {}: {}", path, e);
                self.cache.remove(&path);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.cache.set(&path, &sha);
        Ok(WriteResult { version_token: sha })
    }

    async fn delete_file(&self, path: &str, message: &str) -> Result<(), StorageError> {
        let path = validate_path(path)?;
        let client = self.client()?;

        let token = match self.cache.get(&path) {
            Some(token) => token,
            None => self
                .current_token(client, &path)
                .await?
                .ok_or_else(|| StorageError::NotFound(path.clone()))?,
        };

        let result = client.delete_contents(&path, message, &token).await;
        self.cache.remove(&path);
        result
    }

    async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>, StorageError> {
        let client = self.client()?;
        let path = normalize_path(path);

        match client.get_contents(&path).await? {
            Some(Contents::Directory(entries)) => Ok(entries
                .into_iter()
                .filter_map(|e| match e.kind.as_str() {
                    "dir" => Some(ListEntry::dir(e.path)),
                    "file" => Some(ListEntry::file(e.path)),
                    _ => None,
                })
                .collect()),
            Some(Contents::File(_)) | None => Ok(Vec::new()),
        }
    }

    async fn get_history(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let path = validate_path(path)?;
        self.client()?.list_commits(&path, limit).await
    }

    async fn check_connection(&self) -> bool {
        match &self.client {
            Some(client) => client.ping().await,
            None => false,
        }
    }

    fn mode_info(&self) -> ModeInfo {
        MODE_INFO
    }
}
