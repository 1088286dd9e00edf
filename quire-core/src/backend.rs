//! The closed set of storage backends.
//!
//! The orchestrator builds exactly one [`Backend`] from the user's
//! configuration and hands it to every collaborator by reference.

use crate::adapter::StorageAdapter;
use crate::error::StorageError;
use crate::git::{EmbeddedGitAdapter, GitSettings};
use crate::local::{LocalSettings, LocalVersionedAdapter};
use crate::model::{File, HistoryEntry, ListEntry, ModeInfo, StorageMode, WriteRequest, WriteResult};
use crate::remote::{RemoteSettings, RemoteVersionedAdapter};

/// Settings for whichever backend the configuration selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    Remote(RemoteSettings),
    Git(GitSettings),
    Local(LocalSettings),
}

impl BackendSettings {
    pub fn mode(&self) -> StorageMode {
        match self {
            BackendSettings::Remote(_) => StorageMode::Github,
            BackendSettings::Git(_) => StorageMode::LocalGit,
            BackendSettings::Local(_) => StorageMode::Local,
        }
    }
}

#[derive(Debug)]
pub enum Backend {
    Remote(RemoteVersionedAdapter),
    Git(EmbeddedGitAdapter),
    Local(LocalVersionedAdapter),
}

impl Backend {
    /// An unconfigured backend of the given mode.
    pub fn for_mode(mode: StorageMode) -> Self {
        match mode {
            StorageMode::Github => Backend::Remote(RemoteVersionedAdapter::new()),
            StorageMode::LocalGit => Backend::Git(EmbeddedGitAdapter::new()),
            StorageMode::Local => Backend::Local(LocalVersionedAdapter::new()),
        }
    }

    /// Builds and configures the backend matching `settings`.
    pub async fn connect(settings: BackendSettings) -> Result<Self, StorageError> {
        let mut backend = Backend::for_mode(settings.mode());
        backend.configure(settings).await?;
        Ok(backend)
    }

    pub fn mode(&self) -> StorageMode {
        match self {
            Backend::Remote(_) => StorageMode::Github,
            Backend::Git(_) => StorageMode::LocalGit,
            Backend::Local(_) => StorageMode::Local,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteVersionedAdapter> {
        match self {
            Backend::Remote(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn as_git(&self) -> Option<&EmbeddedGitAdapter> {
        match self {
            Backend::Git(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalVersionedAdapter> {
        match self {
            Backend::Local(adapter) => Some(adapter),
            _ => None,
        }
    }
}

impl StorageAdapter for Backend {
    type Settings = BackendSettings;

    async fn configure(&mut self, settings: BackendSettings) -> Result<(), StorageError> {
        match (self, settings) {
            (Backend::Remote(a), BackendSettings::Remote(s)) => a.configure(s).await,
            (Backend::Git(a), BackendSettings::Git(s)) => a.configure(s).await,
            (Backend::Local(a), BackendSettings::Local(s)) => a.configure(s).await,
            (backend, settings) => Err(StorageError::InvalidSettings(format!(
                "{} settings cannot configure a {} backend",
                settings.mode(),
                backend.mode()
            ))),
        }
    }

    fn is_configured(&self) -> bool {
        match self {
            Backend::Remote(a) => a.is_configured(),
            Backend::Git(a) => a.is_configured(),
            Backend::Local(a) => a.is_configured(),
        }
    }

    async fn get_file(&self, path: &str) -> Result<Option<File>, StorageError> {
        match self {
            Backend::Remote(a) => a.get_file(path).await,
            Backend::Git(a) => a.get_file(path).await,
            Backend::Local(a) => a.get_file(path).await,
        }
    }

    async fn put_file(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        match self {
            Backend::Remote(a) => a.put_file(request).await,
            Backend::Git(a) => a.put_file(request).await,
            Backend::Local(a) => a.put_file(request).await,
        }
    }

    async fn delete_file(&self, path: &str, message: &str) -> Result<(), StorageError> {
        match self {
            Backend::Remote(a) => a.delete_file(path, message).await,
            Backend::Git(a) => a.delete_file(path, message).await,
            Backend::Local(a) => a.delete_file(path, message).await,
        }
    }

    async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>, StorageError> {
        match self {
            Backend::Remote(a) => a.list_files(path).await,
            Backend::Git(a) => a.list_files(path).await,
            Backend::Local(a) => a.list_files(path).await,
        }
    }

    async fn get_history(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        match self {
            Backend::Remote(a) => a.get_history(path, limit).await,
            Backend::Git(a) => a.get_history(path, limit).await,
            Backend::Local(a) => a.get_history(path, limit).await,
        }
    }

    async fn check_connection(&self) -> bool {
        match self {
            Backend::Remote(a) => a.check_connection().await,
            Backend::Git(a) => a.check_connection().await,
            Backend::Local(a) => a.check_connection().await,
        }
    }

    fn mode_info(&self) -> ModeInfo {
        match self {
            Backend::Remote(a) => a.mode_info(),
            Backend::Git(a) => a.mode_info(),
            Backend::Local(a) => a.mode_info(),
        }
    }
}
