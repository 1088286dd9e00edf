//! Data types exchanged between adapters and their callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document.
///
/// `path` is a forward-slash-delimited logical identifier. `version_token`
/// identifies the exact state of the file; it only exists for files that
/// exist, so lookups of absent paths return `None` instead of a `File`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub path: String,
    pub content: String,
    pub version_token: String,
}

/// A request to create or update a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
    /// Human-readable description of the change.
    pub message: String,
    /// The token the caller last observed. `None` means "use what the adapter
    /// last saw", or create semantics when nothing was seen.
    pub expected_version_token: Option<String>,
    /// Overwrite even if the backend holds a version the caller has not seen.
    pub force: bool,
}

impl WriteRequest {
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            message: message.into(),
            expected_version_token: None,
            force: false,
        }
    }

    /// Sets the optimistic-concurrency precondition.
    pub fn expecting(mut self, token: impl Into<String>) -> Self {
        self.expected_version_token = Some(token.into());
        self
    }

    /// Allows overwriting a version the caller has not observed.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub version_token: String,
}

/// One entry of a file's change history. Lists are ordered newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Commit or version identifier.
    pub id: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// File the entry belongs to, when the log spans several files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::File => write!(f, "file"),
            EntryType::Dir => write!(f, "dir"),
        }
    }
}

/// An entry of a directory-style listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl ListEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::Dir,
        }
    }
}

/// Author identity recorded on version-control-backed writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "Quire".to_string(),
            email: "quire@localhost".to_string(),
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Storage mode, as persisted in the configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMode {
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "local-git")]
    LocalGit,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Github => "github",
            StorageMode::Local => "local",
            StorageMode::LocalGit => "local-git",
        }
    }

    /// Parse from string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(StorageMode::Github),
            "local" => Some(StorageMode::Local),
            "local-git" | "local_git" | "git" => Some(StorageMode::LocalGit),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a backend's capabilities and limitations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeInfo {
    pub mode: StorageMode,
    pub name: &'static str,
    pub description: &'static str,
    pub requires_network: bool,
    pub supports_history: bool,
    pub supports_branches: bool,
    pub supports_export: bool,
    pub capabilities: &'static [&'static str],
    pub limitations: &'static [&'static str],
}

/// Splits a logical path into its parent directory and final name.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Normalizes a logical path: trims surrounding slashes and collapses empty
/// segments.
pub(crate) fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
