//! The contract every storage backend satisfies.

use crate::error::StorageError;
use crate::model::{File, HistoryEntry, ListEntry, ModeInfo, WriteRequest, WriteResult};

/// Capability set shared by all storage backends.
///
/// Operations are async and suspend only on I/O. Adapters keep their mutable
/// state (the version-token cache) behind `&self`, so one configured adapter
/// can be handed to every collaborator by reference.
#[allow(async_fn_in_trait)]
pub trait StorageAdapter {
    /// Backend-specific settings accepted by [`configure`](Self::configure).
    type Settings;

    /// Validates and stores settings. Marks the adapter configured only on
    /// success; calling it again with the same settings is harmless.
    async fn configure(&mut self, settings: Self::Settings) -> Result<(), StorageError>;

    /// Pure predicate, no I/O.
    fn is_configured(&self) -> bool;

    /// Reads a file. Absent paths yield `Ok(None)`, never an error.
    async fn get_file(&self, path: &str) -> Result<Option<File>, StorageError>;

    /// Creates or updates a file atomically.
    ///
    /// Never overwrites a version the caller has not observed unless
    /// `request.force` is set.
    async fn put_file(&self, request: WriteRequest) -> Result<WriteResult, StorageError>;

    /// Deletes a file. Fails with [`StorageError::NotFound`] when no current
    /// version is known.
    async fn delete_file(&self, path: &str, message: &str) -> Result<(), StorageError>;

    /// Lists the immediate children of a directory. Empty or missing
    /// directories yield an empty list.
    async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>, StorageError>;

    /// Change history of a file, newest-first, at most `limit` entries.
    async fn get_history(&self, path: &str, limit: usize)
        -> Result<Vec<HistoryEntry>, StorageError>;

    /// Liveness probe. Does not mutate state.
    async fn check_connection(&self) -> bool;

    /// Static capability description.
    fn mode_info(&self) -> ModeInfo;

    /// Writes `content` with create-or-update semantics and no explicit token.
    async fn save_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<WriteResult, StorageError> {
        self.put_file(WriteRequest::new(path, content, message))
            .await
    }

    /// Returns true if `path` currently exists.
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.get_file(path).await?.is_some())
    }
}

/// Rejects empty paths and paths that try to escape the store.
pub(crate) fn validate_path(path: &str) -> Result<String, StorageError> {
    let normalized = crate::model::normalize_path(path);
    if normalized.is_empty() {
        return Err(StorageError::InvalidSettings("file path is empty".to_string()));
    }
    if normalized.split('/').any(|s| s == "." || s == "..") {
        return Err(StorageError::InvalidSettings(format!(
            "invalid file path: {}",
            path
        )));
    }
    Ok(normalized)
}
