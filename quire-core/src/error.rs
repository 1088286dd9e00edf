//! Error taxonomy shared by every storage adapter.
//!
//! Adapters raise a [`StorageError`]; collaborators that only need to decide
//! how to react (reload, re-enter credentials, go offline) use
//! [`StorageError::kind`] instead of matching on variants or message text.

use thiserror::Error;

/// Coarse classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An operation was attempted before `configure()` succeeded.
    NotConfigured,
    /// The file required by the operation does not exist.
    NotFound,
    /// The optimistic-concurrency precondition failed.
    Conflict,
    /// The backend rejected the credential.
    AuthFailure,
    /// The backend could not be reached or answered unexpectedly.
    TransportFailure,
    /// Local failure (disk, database, malformed data).
    Internal,
}

impl ErrorKind {
    /// Short advice a user-facing collaborator can show for this kind.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Conflict => Some("The file changed elsewhere. Reload it and try again."),
            ErrorKind::AuthFailure => Some("The credential was rejected. Reconfigure it."),
            ErrorKind::TransportFailure => Some("Working offline. Try again later."),
            ErrorKind::NotConfigured => Some("Run with a valid storage configuration first."),
            ErrorKind::NotFound | ErrorKind::Internal => None,
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage is not configured")]
    NotConfigured,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Conflict on {path}: {message}. Reload the file and retry.")]
    Conflict { path: String, message: String },

    #[error("Write to {path} still conflicted after refreshing the version token")]
    RetryExhausted { path: String },

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Incompatible bundle: {0}")]
    IncompatibleBundle(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Builds a conflict error for `path`.
    pub fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Conflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classifies this error into the closed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotConfigured => ErrorKind::NotConfigured,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Conflict { .. } | StorageError::RetryExhausted { .. } => {
                ErrorKind::Conflict
            }
            StorageError::AuthFailure(_) => ErrorKind::AuthFailure,
            StorageError::Transport(_) => ErrorKind::TransportFailure,
            StorageError::Git(e) => git_error_kind(e),
            StorageError::InvalidSettings(_)
            | StorageError::IncompatibleBundle(_)
            | StorageError::Encoding(_)
            | StorageError::Database(_)
            | StorageError::Migration(_)
            | StorageError::Io(_)
            | StorageError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for optimistic-concurrency failures.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

fn git_error_kind(e: &git2::Error) -> ErrorKind {
    if e.code() == git2::ErrorCode::Auth {
        return ErrorKind::AuthFailure;
    }
    match e.class() {
        git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh => {
            ErrorKind::TransportFailure
        }
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_is_conflict() {
        let err = StorageError::RetryExhausted {
            path: "a.md".to_string(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.kind().hint(), ErrorKind::Conflict.hint());
    }

    #[test]
    fn test_conflict_message_mentions_reload() {
        let err = StorageError::conflict("journal/2025-01-01.md", "sha mismatch");
        assert!(err.to_string().contains("Reload"));
        assert!(err.to_string().contains("journal/2025-01-01.md"));
    }

    #[test]
    fn test_git_auth_error_kind() {
        let err = git2::Error::new(
            git2::ErrorCode::Auth,
            git2::ErrorClass::Http,
            "bad credentials",
        );
        assert_eq!(StorageError::from(err).kind(), ErrorKind::AuthFailure);
    }

    #[test]
    fn test_git_net_error_kind() {
        let err = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "unreachable",
        );
        assert_eq!(StorageError::from(err).kind(), ErrorKind::TransportFailure);
    }

    #[test]
    fn test_io_error_is_internal() {
        let err = StorageError::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.kind().hint().is_none());
    }
}
