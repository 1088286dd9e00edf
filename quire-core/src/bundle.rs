//! Portable export envelope.
//!
//! ```json
//! { "version": 1, "type": "quire-git-bundle", "exportDate": "...",
//!   "files": [...], "history": [...], "branches": [...] }
//! ```
//!
//! Import checks `version` and `type` before any existing data is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::{File, HistoryEntry};

/// Current envelope version.
pub const BUNDLE_VERSION: u32 = 1;

/// Kind of corpus a bundle carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleType {
    /// Full export of an embedded git repository.
    #[serde(rename = "quire-git-bundle")]
    GitBundle,
    /// Full export of the local versioned store.
    #[serde(rename = "quire-local-export")]
    LocalExport,
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleType::GitBundle => write!(f, "quire-git-bundle"),
            BundleType::LocalExport => write!(f, "quire-local-export"),
        }
    }
}

/// Exported files with their history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub version: u32,
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    pub export_date: DateTime<Utc>,
    pub files: Vec<File>,
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
}

/// Loosely typed view used to validate the envelope before trusting it.
#[derive(Deserialize)]
struct EnvelopeHeader {
    version: Option<serde_json::Value>,
    #[serde(rename = "type")]
    bundle_type: Option<serde_json::Value>,
}

impl Bundle {
    pub fn new(bundle_type: BundleType, files: Vec<File>, history: Vec<HistoryEntry>) -> Self {
        Self {
            version: BUNDLE_VERSION,
            bundle_type,
            export_date: Utc::now(),
            files,
            history,
            branches: None,
        }
    }

    /// Parses a bundle from JSON, rejecting unknown versions and types with
    /// [`StorageError::IncompatibleBundle`].
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let header: EnvelopeHeader = serde_json::from_str(json)
            .map_err(|e| StorageError::IncompatibleBundle(format!("not a bundle: {}", e)))?;

        match header.version.as_ref().and_then(|v| v.as_u64()) {
            Some(v) if v == u64::from(BUNDLE_VERSION) => {}
            Some(v) => {
                return Err(StorageError::IncompatibleBundle(format!(
                    "unsupported version {} (expected {})",
                    v, BUNDLE_VERSION
                )))
            }
            None => {
                return Err(StorageError::IncompatibleBundle(
                    "missing version marker".to_string(),
                ))
            }
        }

        let type_name = header
            .bundle_type
            .as_ref()
            .and_then(|t| t.as_str())
            .ok_or_else(|| StorageError::IncompatibleBundle("missing type".to_string()))?;
        if !matches!(type_name, "quire-git-bundle" | "quire-local-export") {
            return Err(StorageError::IncompatibleBundle(format!(
                "unknown type '{}'",
                type_name
            )));
        }

        serde_json::from_str(json)
            .map_err(|e| StorageError::IncompatibleBundle(format!("malformed bundle: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that this bundle can be imported by a store expecting
    /// `expected`.
    pub fn validate(&self, expected: BundleType) -> Result<(), StorageError> {
        if self.version != BUNDLE_VERSION {
            return Err(StorageError::IncompatibleBundle(format!(
                "unsupported version {} (expected {})",
                self.version, BUNDLE_VERSION
            )));
        }
        if self.bundle_type != expected {
            return Err(StorageError::IncompatibleBundle(format!(
                "expected a {} bundle, got {}",
                expected, self.bundle_type
            )));
        }
        Ok(())
    }
}
