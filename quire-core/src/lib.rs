//! Quire Core Library
//!
//! Storage adapters and the version-token write protocol behind Quire.

pub mod adapter;
pub mod backend;
pub mod bundle;
pub mod codec;
pub mod error;
pub mod git;
pub mod local;
pub mod model;
pub mod remote;

pub use adapter::StorageAdapter;
pub use backend::{Backend, BackendSettings};
pub use bundle::{Bundle, BundleType, BUNDLE_VERSION};
pub use codec::{decode_content, encode_content};
pub use error::{ErrorKind, StorageError};
pub use git::{
    BranchInfo, ChangeStatus, EmbeddedGitAdapter, FileChange, GitRemote, GitSettings, PullOutcome,
};
pub use local::{LocalSettings, LocalVersionedAdapter};
pub use model::{
    Author, EntryType, File, HistoryEntry, ListEntry, ModeInfo, StorageMode, WriteRequest,
    WriteResult,
};
pub use remote::{RemoteSettings, RemoteVersionedAdapter};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
