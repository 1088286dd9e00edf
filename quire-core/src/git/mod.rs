//! Storage in an embedded, bare git repository.
//!
//! The repository lives at `repo_dir` and is created on first use with an
//! initial empty commit. Later sessions detect it by its metadata and reuse
//! it. Every write or delete becomes one commit on the current branch,
//! authored with the configured identity, and the returned version token is
//! that commit's id.
//!
//! There is no working copy. Trees are built straight in the object database
//! from the parent commit, so nothing on disk can drift from `HEAD`.
//!
//! The adapter is single-writer: expected version tokens are not checked.
//! Push and pull are opt-in and best-effort; a local commit never depends on
//! the remote being reachable.

mod remote;
mod tree;

use std::path::PathBuf;

use chrono::DateTime;
use git2::{
    Branch, BranchType, Commit, Delta, ErrorCode, Oid, Reference, Repository,
    RepositoryInitOptions, Signature, Sort,
};
use serde::Serialize;

use crate::adapter::{validate_path, StorageAdapter};
use crate::bundle::{Bundle, BundleType};
use crate::error::StorageError;
use crate::model::{
    normalize_path, Author, File, HistoryEntry, ListEntry, ModeInfo, StorageMode, WriteRequest,
    WriteResult,
};

pub use remote::{GitRemote, PullOutcome};

/// Settings for the embedded git adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSettings {
    pub repo_dir: PathBuf,
    /// Branch created by the initial commit of a new repository. Existing
    /// repositories keep whatever branch is checked out.
    pub branch: String,
    pub author: Author,
    pub remote: Option<GitRemote>,
    /// Push after every local commit.
    pub auto_push: bool,
}

impl GitSettings {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            branch: "main".to_string(),
            author: Author::default(),
            remote: None,
            auto_push: false,
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_remote(mut self, remote: GitRemote) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_auto_push(mut self, auto_push: bool) -> Self {
        self.auto_push = auto_push;
        self
    }

    fn validate(&self) -> Result<(), StorageError> {
        if self.repo_dir.as_os_str().is_empty() {
            return Err(StorageError::InvalidSettings(
                "git storage requires 'repo_dir'".to_string(),
            ));
        }
        if !Reference::is_valid_name(&format!("refs/heads/{}", self.branch)) {
            return Err(StorageError::InvalidSettings(format!(
                "invalid branch name: {}",
                self.branch
            )));
        }
        if self.author.name.trim().is_empty() || self.author.email.trim().is_empty() {
            return Err(StorageError::InvalidSettings(
                "git storage requires an author name and email".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.url.trim().is_empty() || remote.name.trim().is_empty() {
                return Err(StorageError::InvalidSettings(
                    "git remote requires a url and a name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// How a file differs between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub current: bool,
    /// Commit id the branch points at.
    pub head: String,
}

const MODE_INFO: ModeInfo = ModeInfo {
    mode: StorageMode::LocalGit,
    name: "Local git repository",
    description: "Files are committed to a git repository on this machine.",
    requires_network: false,
    supports_history: true,
    supports_branches: true,
    supports_export: true,
    capabilities: &[
        "works offline",
        "full commit history",
        "branches and diffs",
        "bundle export and import",
        "optional push and pull",
    ],
    limitations: &[
        "single writer",
        "no automatic merge of diverged histories",
    ],
};

/// Adapter storing files as commits in an embedded repository.
#[derive(Debug, Default)]
pub struct EmbeddedGitAdapter {
    settings: Option<GitSettings>,
}

impl EmbeddedGitAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> Result<&GitSettings, StorageError> {
        self.settings.as_ref().ok_or(StorageError::NotConfigured)
    }

    fn repo(&self) -> Result<Repository, StorageError> {
        Ok(Repository::open_bare(&self.settings()?.repo_dir)?)
    }

    fn signature(&self) -> Result<Signature<'static>, StorageError> {
        let author = &self.settings()?.author;
        Ok(Signature::now(&author.name, &author.email)?)
    }

    /// Commits `tree` on top of `parent` and advances the current branch.
    fn commit(
        &self,
        repo: &Repository,
        message: &str,
        tree: Oid,
        parent: &Commit,
    ) -> Result<Oid, StorageError> {
        let tree = repo.find_tree(tree)?;
        let signature = self.signature()?;
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[parent])?;
        tracing::debug!("Committed {}: {}", oid, message);
        self.after_commit(repo);
        Ok(oid)
    }

    fn after_commit(&self, repo: &Repository) {
        let Some(settings) = &self.settings else {
            return;
        };
        let Some(remote) = settings.remote.as_ref().filter(|_| settings.auto_push) else {
            return;
        };

        let result = current_branch(repo).and_then(|branch| remote::push(repo, remote, &branch));
        if let Err(e) = result {
            tracing::warn!("Auto-push to {} failed, commit kept locally: {}", remote.url, e);
        }
    }

    fn configured_remote(&self) -> Result<&GitRemote, StorageError> {
        self.settings()?
            .remote
            .as_ref()
            .ok_or_else(|| StorageError::InvalidSettings("no git remote is configured".to_string()))
    }

    /// Repository-wide log, newest-first.
    pub async fn log(&self, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let repo = self.repo()?;
        history(&repo, None, limit)
    }

    pub async fn current_branch(&self) -> Result<String, StorageError> {
        current_branch(&self.repo()?)
    }

    /// Creates `name` at the current commit, optionally switching to it.
    pub async fn create_branch(&self, name: &str, checkout: bool) -> Result<(), StorageError> {
        let repo = self.repo()?;
        if !Branch::name_is_valid(name)? {
            return Err(StorageError::InvalidSettings(format!(
                "invalid branch name: {}",
                name
            )));
        }
        if repo.find_branch(name, BranchType::Local).is_ok() {
            return Err(StorageError::InvalidSettings(format!(
                "branch already exists: {}",
                name
            )));
        }

        let head = head_commit(&repo)?;
        repo.branch(name, &head, false)?;
        tracing::info!("Created branch {} at {}", name, head.id());

        if checkout {
            repo.set_head(&format!("refs/heads/{}", name))?;
        }
        Ok(())
    }

    pub async fn list_branches(&self) -> Result<Vec<BranchInfo>, StorageError> {
        let repo = self.repo()?;
        list_branches(&repo)
    }

    /// Switches the current branch. Subsequent reads and writes use it.
    pub async fn checkout(&self, name: &str) -> Result<(), StorageError> {
        let repo = self.repo()?;
        match repo.find_branch(name, BranchType::Local) {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(StorageError::NotFound(format!("branch {}", name)))
            }
            Err(e) => return Err(e.into()),
        }
        repo.set_head(&format!("refs/heads/{}", name))?;
        tracing::info!("Checked out {}", name);
        Ok(())
    }

    /// Files that differ between two revisions (commit ids or branch names).
    pub async fn diff(&self, from: &str, to: &str) -> Result<Vec<FileChange>, StorageError> {
        let repo = self.repo()?;
        let old = resolve_tree(&repo, from)?;
        let new = resolve_tree(&repo, to)?;
        let diff = repo.diff_tree_to_tree(Some(&old), Some(&new), None)?;

        let changes = diff
            .deltas()
            .filter_map(|delta| {
                let status = match delta.status() {
                    Delta::Added => ChangeStatus::Added,
                    Delta::Deleted => ChangeStatus::Deleted,
                    Delta::Modified | Delta::Renamed | Delta::Copied | Delta::Typechange => {
                        ChangeStatus::Modified
                    }
                    _ => return None,
                };
                let side = match status {
                    ChangeStatus::Deleted => delta.old_file(),
                    _ => delta.new_file(),
                };
                let path = side.path()?.to_string_lossy().into_owned();
                Some(FileChange { path, status })
            })
            .collect();
        Ok(changes)
    }

    /// Snapshot of the current branch with the full log and branch names.
    pub async fn export_bundle(&self) -> Result<Bundle, StorageError> {
        let repo = self.repo()?;
        let head = head_commit(&repo)?;
        let tree = head.tree()?;
        let token = head.id().to_string();

        let mut files = Vec::new();
        for path in tree::file_paths(&tree)? {
            if let Some(bytes) = tree::read_blob(&repo, &tree, &path)? {
                files.push(File {
                    content: utf8(&path, bytes)?,
                    path,
                    version_token: token.clone(),
                });
            }
        }

        let history = history(&repo, None, usize::MAX)?;
        let branches = list_branches(&repo)?.into_iter().map(|b| b.name).collect();

        tracing::info!("Exported {} files and {} commits", files.len(), history.len());
        let mut bundle = Bundle::new(BundleType::GitBundle, files, history);
        bundle.branches = Some(branches);
        Ok(bundle)
    }

    /// Replaces the tree of the current branch with the bundle's files in a
    /// single commit and recreates missing branches at that commit.
    ///
    /// The envelope and every path are validated before anything is written.
    /// Returns the number of imported files.
    pub async fn import_bundle(&self, bundle: &Bundle) -> Result<usize, StorageError> {
        bundle.validate(BundleType::GitBundle)?;
        let paths = bundle
            .files
            .iter()
            .map(|f| validate_path(&f.path))
            .collect::<Result<Vec<_>, _>>()?;

        let repo = self.repo()?;
        let head = head_commit(&repo)?;

        let mut tree_oid = repo.treebuilder(None)?.write()?;
        for (path, file) in paths.iter().zip(&bundle.files) {
            let current = repo.find_tree(tree_oid)?;
            let blob = repo.blob(file.content.as_bytes())?;
            let components: Vec<&str> = path.split('/').collect();
            tree_oid = tree::upsert(&repo, Some(&current), &components, blob)?;
        }

        let message = format!(
            "Import bundle exported {}",
            bundle.export_date.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let oid = self.commit(&repo, &message, tree_oid, &head)?;
        let imported = repo.find_commit(oid)?;

        for name in bundle.branches.iter().flatten() {
            if !Branch::name_is_valid(name)? {
                tracing::warn!("Skipping invalid branch name in bundle: {}", name);
                continue;
            }
            if repo.find_branch(name, BranchType::Local).is_err() {
                repo.branch(name, &imported, false)?;
            }
        }

        tracing::info!("Imported {} files", bundle.files.len());
        Ok(bundle.files.len())
    }

    /// Pushes the current branch to the configured remote.
    pub async fn push(&self) -> Result<(), StorageError> {
        let remote = self.configured_remote()?;
        let repo = self.repo()?;
        let branch = current_branch(&repo)?;
        remote::push(&repo, remote, &branch)
    }

    /// Fetches the current branch from the configured remote and
    /// fast-forwards when possible. Diverged histories are a conflict.
    pub async fn pull(&self) -> Result<PullOutcome, StorageError> {
        let remote = self.configured_remote()?;
        let repo = self.repo()?;
        let branch = current_branch(&repo)?;
        remote::pull(&repo, remote, &branch)
    }
}

impl StorageAdapter for EmbeddedGitAdapter {
    type Settings = GitSettings;

    async fn configure(&mut self, settings: GitSettings) -> Result<(), StorageError> {
        settings.validate()?;
        let repo = open_or_init(&settings)?;

        if repo.head().is_err() {
            let signature = Signature::now(&settings.author.name, &settings.author.email)?;
            let empty = repo.find_tree(repo.treebuilder(None)?.write()?)?;
            repo.commit(Some("HEAD"), &signature, &signature, "Initial commit", &empty, &[])?;
            tracing::info!("Created initial commit on {}", settings.branch);
        }

        if let Some(remote) = &settings.remote {
            remote::ensure_remote(&repo, remote)?;
        }

        self.settings = Some(settings);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.settings.is_some()
    }

    async fn get_file(&self, path: &str) -> Result<Option<File>, StorageError> {
        let path = validate_path(path)?;
        let repo = self.repo()?;
        let head = head_commit(&repo)?;
        let tree = head.tree()?;

        match tree::read_blob(&repo, &tree, &path)? {
            Some(bytes) => Ok(Some(File {
                content: utf8(&path, bytes)?,
                path,
                version_token: head.id().to_string(),
            })),
            None => Ok(None),
        }
    }

    async fn put_file(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        let path = validate_path(&request.path)?;
        let repo = self.repo()?;
        let head = head_commit(&repo)?;

        let blob = repo.blob(request.content.as_bytes())?;
        let components: Vec<&str> = path.split('/').collect();
        let parent_tree = head.tree()?;
        let tree = tree::upsert(&repo, Some(&parent_tree), &components, blob)?;

        let oid = self.commit(&repo, &request.message, tree, &head)?;
        Ok(WriteResult {
            version_token: oid.to_string(),
        })
    }

    async fn delete_file(&self, path: &str, message: &str) -> Result<(), StorageError> {
        let path = validate_path(path)?;
        let repo = self.repo()?;
        let head = head_commit(&repo)?;
        let parent_tree = head.tree()?;

        if tree::blob_id(&parent_tree, &path)?.is_none() {
            return Err(StorageError::NotFound(path));
        }

        let components: Vec<&str> = path.split('/').collect();
        let tree = tree::remove(&repo, &parent_tree, &components)?;
        self.commit(&repo, message, tree, &head)?;
        Ok(())
    }

    async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>, StorageError> {
        let repo = self.repo()?;
        let head = head_commit(&repo)?;
        let tree = head.tree()?;
        let entries = tree::list_dir(&repo, &tree, &normalize_path(path))?;
        Ok(entries)
    }

    /// Commits whose tree changed the blob at `path`.
    async fn get_history(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let path = validate_path(path)?;
        let repo = self.repo()?;
        history(&repo, Some(&path), limit)
    }

    async fn check_connection(&self) -> bool {
        self.repo().and_then(|repo| head_commit(&repo).map(|_| ())).is_ok()
    }

    fn mode_info(&self) -> ModeInfo {
        MODE_INFO
    }
}

/// Opens the repository if its metadata exists, otherwise creates it.
fn open_or_init(settings: &GitSettings) -> Result<Repository, StorageError> {
    if settings.repo_dir.join("HEAD").is_file() {
        tracing::debug!("Reusing repository at {}", settings.repo_dir.display());
        return Ok(Repository::open_bare(&settings.repo_dir)?);
    }

    std::fs::create_dir_all(&settings.repo_dir)?;
    let mut options = RepositoryInitOptions::new();
    options.bare(true).initial_head(&settings.branch);
    let repo = Repository::init_opts(&settings.repo_dir, &options)?;
    tracing::info!("Initialized repository at {}", settings.repo_dir.display());
    Ok(repo)
}

fn head_commit(repo: &Repository) -> Result<Commit<'_>, StorageError> {
    Ok(repo.head()?.peel_to_commit()?)
}

fn current_branch(repo: &Repository) -> Result<String, StorageError> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(StorageError::InvalidSettings(
            "HEAD does not point at a branch".to_string(),
        ));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| StorageError::Encoding("branch name is not valid UTF-8".to_string()))
}

fn list_branches(repo: &Repository) -> Result<Vec<BranchInfo>, StorageError> {
    let current = current_branch(repo)?;
    let mut branches = Vec::new();
    for item in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = item?;
        let Some(name) = branch.name()? else {
            continue;
        };
        branches.push(BranchInfo {
            current: name == current,
            name: name.to_string(),
            head: branch.get().peel_to_commit()?.id().to_string(),
        });
    }
    branches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(branches)
}

fn resolve_tree<'r>(
    repo: &'r Repository,
    revision: &str,
) -> Result<git2::Tree<'r>, StorageError> {
    let object = match repo.revparse_single(revision) {
        Ok(object) => object,
        Err(e) if e.code() == ErrorCode::NotFound => {
            return Err(StorageError::NotFound(format!("revision {}", revision)))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(object.peel_to_tree()?)
}

/// Walks the current branch newest-first. With a path, keeps only commits
/// whose blob at that path differs from their first parent's.
fn history(
    repo: &Repository,
    path: Option<&str>,
    limit: usize,
) -> Result<Vec<HistoryEntry>, StorageError> {
    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut entries = Vec::new();
    for oid in walk {
        if entries.len() >= limit {
            break;
        }
        let commit = repo.find_commit(oid?)?;

        if let Some(path) = path {
            let here = tree::blob_id(&commit.tree()?, path)?;
            let before = match commit.parent(0) {
                Ok(parent) => tree::blob_id(&parent.tree()?, path)?,
                Err(_) => None,
            };
            if here == before {
                continue;
            }
        }

        entries.push(HistoryEntry {
            id: commit.id().to_string(),
            message: commit.message().unwrap_or_default().trim_end().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
            timestamp: DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
            parent_id: commit.parent_id(0).ok().map(|id| id.to_string()),
            path: path.map(str::to_string),
        });
    }
    Ok(entries)
}

fn utf8(path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
    String::from_utf8(bytes)
        .map_err(|e| StorageError::Encoding(format!("{} is not valid UTF-8: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn author() -> Author {
        Author {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    async fn configured(settings: GitSettings) -> EmbeddedGitAdapter {
        let mut adapter = EmbeddedGitAdapter::new();
        adapter.configure(settings).await.unwrap();
        adapter
    }

    async fn setup() -> (EmbeddedGitAdapter, TempDir) {
        let temp = TempDir::new().unwrap();
        let settings = GitSettings::new(temp.path().join("repo.git")).with_author(author());
        (configured(settings).await, temp)
    }

    #[tokio::test]
    async fn test_configure_initializes_repository_once() {
        let temp = TempDir::new().unwrap();
        let settings = GitSettings::new(temp.path().join("repo.git")).with_author(author());

        let first = configured(settings.clone()).await;
        assert!(temp.path().join("repo.git/HEAD").is_file());
        let log = first.log(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "Initial commit");

        first.save_file("a.md", "kept", "add a").await.unwrap();

        let second = configured(settings).await;
        assert_eq!(second.log(10).await.unwrap().len(), 2);
        let file = second.get_file("a.md").await.unwrap().unwrap();
        assert_eq!(file.content, "kept");
    }

    #[tokio::test]
    async fn test_configure_rejects_bad_settings() {
        let temp = TempDir::new().unwrap();
        let mut adapter = EmbeddedGitAdapter::new();

        let bad_branch = GitSettings::new(temp.path().join("r.git")).with_branch("no..dots");
        assert!(adapter.configure(bad_branch).await.is_err());

        let no_author = GitSettings::new(temp.path().join("r.git")).with_author(Author {
            name: String::new(),
            email: "x@y".to_string(),
        });
        assert!(adapter.configure(no_author).await.is_err());
        assert!(!adapter.is_configured());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let adapter = EmbeddedGitAdapter::new();
        let err = adapter.get_file("a.md").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
        assert!(!adapter.check_connection().await);
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let (adapter, _temp) = setup().await;

        let result = adapter
            .save_file("journal/2025/day.md", "café ☕", "write day")
            .await
            .unwrap();
        let file = adapter.get_file("journal/2025/day.md").await.unwrap().unwrap();

        assert_eq!(file.content, "café ☕");
        assert_eq!(file.version_token, result.version_token);
    }

    #[tokio::test]
    async fn test_file_cannot_become_a_directory() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("notes", "a plain file", "add notes").await.unwrap();
        let commits = adapter.log(100).await.unwrap().len();

        let err = adapter
            .save_file("notes/child.md", "child", "add child")
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(adapter.get_file("notes").await.unwrap().unwrap().content, "a plain file");
        assert_eq!(adapter.log(100).await.unwrap().len(), commits);
    }

    #[tokio::test]
    async fn test_directory_cannot_become_a_file() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("dir/a.md", "a", "add a").await.unwrap();
        adapter.save_file("dir/b.md", "b", "add b").await.unwrap();

        let err = adapter.save_file("dir", "now a file", "flatten").await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(adapter.get_file("dir/a.md").await.unwrap().unwrap().content, "a");
        assert_eq!(adapter.get_file("dir/b.md").await.unwrap().unwrap().content, "b");
    }

    #[tokio::test]
    async fn test_missing_file_returns_none() {
        let (adapter, _temp) = setup().await;
        assert!(adapter.get_file("missing/path").await.unwrap().is_none());
        assert!(!adapter.exists("missing/path").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_is_commit_id_and_changes_on_every_write() {
        let (adapter, _temp) = setup().await;

        let first = adapter.save_file("a.md", "same", "one").await.unwrap();
        let second = adapter.save_file("a.md", "same", "two").await.unwrap();

        assert_ne!(first.version_token, second.version_token);
        let log = adapter.log(1).await.unwrap();
        assert_eq!(log[0].id, second.version_token);
        assert_eq!(log[0].parent_id.as_deref(), Some(first.version_token.as_str()));
    }

    #[tokio::test]
    async fn test_repeated_reads_return_same_token() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("a.md", "x", "add").await.unwrap();

        let one = adapter.get_file("a.md").await.unwrap().unwrap();
        let two = adapter.get_file("a.md").await.unwrap().unwrap();
        assert_eq!(one.version_token, two.version_token);
    }

    #[tokio::test]
    async fn test_commits_carry_author() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("a.md", "x", "add").await.unwrap();

        let history = adapter.get_history("a.md", 1).await.unwrap();
        assert_eq!(history[0].author, "Ada");
        assert_eq!(history[0].message, "add");
        assert_eq!(history[0].path.as_deref(), Some("a.md"));
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("notes/a.md", "x", "add").await.unwrap();

        adapter.delete_file("notes/a.md", "remove").await.unwrap();

        assert!(adapter.get_file("notes/a.md").await.unwrap().is_none());
        assert!(adapter.list_files("notes").await.unwrap().is_empty());
        let history = adapter.get_history("notes/a.md", 10).await.unwrap();
        let messages: Vec<_> = history.iter().map(|h| h.message.as_str()).collect();
        assert_eq!(messages, vec!["remove", "add"]);
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_not_found() {
        let (adapter, _temp) = setup().await;
        let err = adapter.delete_file("nope.md", "remove").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_files() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("journal/a.md", "a", "a").await.unwrap();
        adapter.save_file("journal/2025/b.md", "b", "b").await.unwrap();
        adapter.save_file("top.md", "t", "t").await.unwrap();

        let mut entries = adapter.list_files("journal").await.unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            entries,
            vec![ListEntry::dir("journal/2025"), ListEntry::file("journal/a.md")]
        );

        let root = adapter.list_files("/").await.unwrap();
        assert_eq!(root.len(), 2);
        assert!(adapter.list_files("empty-dir").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first_and_limited() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("a.md", "1", "one").await.unwrap();
        adapter.save_file("b.md", "x", "other file").await.unwrap();
        adapter.save_file("a.md", "2", "two").await.unwrap();
        adapter.save_file("a.md", "3", "three").await.unwrap();

        let history = adapter.get_history("a.md", 10).await.unwrap();
        let messages: Vec<_> = history.iter().map(|h| h.message.as_str()).collect();
        assert_eq!(messages, vec!["three", "two", "one"]);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
            assert!(pair[0].parent_id.is_some());
        }

        assert_eq!(adapter.get_history("a.md", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_branches() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("a.md", "main", "on main").await.unwrap();

        adapter.create_branch("draft", true).await.unwrap();
        assert_eq!(adapter.current_branch().await.unwrap(), "draft");
        adapter.save_file("draft.md", "wip", "on draft").await.unwrap();

        adapter.checkout("main").await.unwrap();
        assert!(adapter.get_file("draft.md").await.unwrap().is_none());
        assert!(adapter.get_file("a.md").await.unwrap().is_some());

        let branches = adapter.list_branches().await.unwrap();
        let summary: Vec<_> = branches.iter().map(|b| (b.name.as_str(), b.current)).collect();
        assert_eq!(summary, vec![("draft", false), ("main", true)]);
    }

    #[tokio::test]
    async fn test_branch_errors() {
        let (adapter, _temp) = setup().await;

        let err = adapter.checkout("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        adapter.create_branch("draft", false).await.unwrap();
        assert!(adapter.create_branch("draft", false).await.is_err());
        assert!(adapter.create_branch("bad name", false).await.is_err());
        assert_eq!(adapter.current_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_diff_between_commits() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("keep.md", "1", "keep").await.unwrap();
        let base = adapter.save_file("gone.md", "x", "gone").await.unwrap();

        adapter.save_file("keep.md", "2", "edit").await.unwrap();
        adapter.delete_file("gone.md", "drop").await.unwrap();
        let tip = adapter.save_file("new.md", "n", "new").await.unwrap();

        let mut changes = adapter
            .diff(&base.version_token, &tip.version_token)
            .await
            .unwrap();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            changes,
            vec![
                FileChange {
                    path: "gone.md".to_string(),
                    status: ChangeStatus::Deleted
                },
                FileChange {
                    path: "keep.md".to_string(),
                    status: ChangeStatus::Modified
                },
                FileChange {
                    path: "new.md".to_string(),
                    status: ChangeStatus::Added
                },
            ]
        );

        let err = adapter.diff("nope", "main").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_bundle_roundtrip() {
        let (source, _a) = setup().await;
        source.save_file("journal/a.md", "café", "a").await.unwrap();
        source.save_file("b.md", "b", "b").await.unwrap();
        source.create_branch("draft", false).await.unwrap();

        let bundle = source.export_bundle().await.unwrap();
        assert_eq!(bundle.files.len(), 2);
        assert_eq!(bundle.history.len(), 3);
        let json = bundle.to_json().unwrap();

        let (target, _b) = setup().await;
        target.save_file("stale.md", "old", "old").await.unwrap();
        let imported = target
            .import_bundle(&Bundle::from_json(&json).unwrap())
            .await
            .unwrap();

        assert_eq!(imported, 2);
        let file = target.get_file("journal/a.md").await.unwrap().unwrap();
        assert_eq!(file.content, "café");
        assert!(target.get_file("stale.md").await.unwrap().is_none());
        let names: Vec<_> = target
            .list_branches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["draft", "main"]);
    }

    #[tokio::test]
    async fn test_import_rejects_colliding_paths() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("kept.md", "x", "a").await.unwrap();
        let before = adapter.log(100).await.unwrap().len();

        let files = vec![
            File {
                path: "notes".to_string(),
                content: "file".to_string(),
                version_token: "t1".to_string(),
            },
            File {
                path: "notes/child.md".to_string(),
                content: "child".to_string(),
                version_token: "t2".to_string(),
            },
        ];
        let bundle = Bundle::new(BundleType::GitBundle, files, Vec::new());
        let err = adapter.import_bundle(&bundle).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(adapter.log(100).await.unwrap().len(), before);
        assert!(adapter.get_file("kept.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_rejects_wrong_bundle_type() {
        let (adapter, _temp) = setup().await;
        adapter.save_file("a.md", "x", "a").await.unwrap();
        let before = adapter.log(100).await.unwrap().len();

        let bundle = Bundle::new(BundleType::LocalExport, Vec::new(), Vec::new());
        let err = adapter.import_bundle(&bundle).await.unwrap_err();

        assert!(matches!(err, StorageError::IncompatibleBundle(_)));
        assert_eq!(adapter.log(100).await.unwrap().len(), before);
        assert!(adapter.get_file("a.md").await.unwrap().is_some());
    }

    fn remote_at(temp: &TempDir) -> GitRemote {
        let path = temp.path().join("remote.git");
        Repository::init_bare(&path).unwrap();
        GitRemote::new(path.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_push_and_pull_through_bare_remote() {
        let temp = TempDir::new().unwrap();
        let remote = remote_at(&temp);

        let alice = configured(
            GitSettings::new(temp.path().join("alice.git"))
                .with_author(author())
                .with_remote(remote.clone()),
        )
        .await;
        // A different author keeps Bob's initial commit distinct from Alice's.
        let bob = configured(
            GitSettings::new(temp.path().join("bob.git"))
                .with_author(Author {
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                })
                .with_remote(remote),
        )
        .await;
        assert_ne!(
            alice.log(1).await.unwrap()[0].id,
            bob.log(1).await.unwrap()[0].id
        );

        assert_eq!(bob.pull().await.unwrap(), PullOutcome::NothingUpstream);

        alice.save_file("a.md", "first", "first").await.unwrap();
        alice.push().await.unwrap();
        assert_eq!(bob.pull().await.unwrap(), PullOutcome::Adopted);
        assert_eq!(bob.get_file("a.md").await.unwrap().unwrap().content, "first");

        alice.save_file("a.md", "second", "second").await.unwrap();
        alice.push().await.unwrap();
        assert_eq!(bob.pull().await.unwrap(), PullOutcome::FastForwarded);
        assert_eq!(bob.pull().await.unwrap(), PullOutcome::UpToDate);

        bob.save_file("b.md", "bob", "bob").await.unwrap();
        assert_eq!(bob.pull().await.unwrap(), PullOutcome::AheadOfRemote);

        alice.save_file("c.md", "alice", "alice").await.unwrap();
        alice.push().await.unwrap();
        let err = bob.pull().await.unwrap_err();
        assert!(err.is_conflict());
        assert!(bob.get_file("b.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_auto_push() {
        let temp = TempDir::new().unwrap();
        let remote = remote_at(&temp);
        let remote_path = remote.url.clone();

        let adapter = configured(
            GitSettings::new(temp.path().join("repo.git"))
                .with_author(author())
                .with_remote(remote)
                .with_auto_push(true),
        )
        .await;
        let result = adapter.save_file("a.md", "x", "add").await.unwrap();

        let upstream = Repository::open_bare(&remote_path).unwrap();
        let oid = upstream.refname_to_id("refs/heads/main").unwrap();
        assert_eq!(oid.to_string(), result.version_token);
    }

    #[tokio::test]
    async fn test_local_writes_survive_unreachable_remote() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist.git");

        let adapter = configured(
            GitSettings::new(temp.path().join("repo.git"))
                .with_author(author())
                .with_remote(GitRemote::new(missing.to_string_lossy().into_owned()))
                .with_auto_push(true),
        )
        .await;

        adapter.save_file("a.md", "offline", "add").await.unwrap();
        assert_eq!(adapter.get_file("a.md").await.unwrap().unwrap().content, "offline");
        assert!(adapter.push().await.is_err());
    }

    #[tokio::test]
    async fn test_push_without_remote_is_rejected() {
        let (adapter, _temp) = setup().await;
        assert!(matches!(
            adapter.push().await,
            Err(StorageError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_mode_info() {
        let info = EmbeddedGitAdapter::new().mode_info();
        assert_eq!(info.mode, StorageMode::LocalGit);
        assert!(info.supports_branches);
        assert!(!info.requires_network);
    }
}
